//! # Component Container
//!
//! Every component of one peer, built in dependency order and shared
//! behind its own lock.
//!
//! ```text
//! registry ──→ RegistryDirectory ──→ chain assembler, consensus (trust), messaging (keys)
//! block store + chain assembler ──→ ChainLedger ──→ consensus (history, appender)
//! device key ──→ DeviceSigner ──→ consensus (authority devices only)
//! ```
//!
//! ## Lock order
//!
//! consensus → block store → registry. A path holding a later lock never
//! takes an earlier one, and no lock is held across an `.await`.

use crate::adapters::directory::RegistryDirectory;
use crate::adapters::ledger::ChainLedger;
use crate::adapters::pending::PendingSyncs;
use crate::adapters::signer::DeviceSigner;
use crate::adapters::storage::{
    open_store, STORE_BLOCKS, STORE_CRDT, STORE_MESSAGES, STORE_REGISTRY,
};
use crate::container::config::{ConfigError, NodeConfig};
use crate::errors::{NodeError, NodeResult};
use crate::wire::{ModelUpdate, Payload};
use im_01_block_store::BlockStoreService;
use im_02_chain_assembler::ChainAssembler;
use im_03_crdt::CrdtEngine;
use im_04_consensus::{AuthoritySigner, ConsensusDependencies, ConsensusService};
use im_05_messaging::{
    DeliveryStatus, MessagingDependencies, MessagingService, PeerTransport, SendReceipt,
};
use im_06_peer_registry::PeerRegistry;
use mesh_telemetry::MESSAGES;
use parking_lot::{Mutex, RwLock};
use shared_bus::{InMemoryEventBus, MeshEvent};
use shared_crypto::{Secp256k1KeyPair, Secp256k1PublicKey};
use shared_types::{DeviceId, TimeSource};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// All components of one peer.
pub struct PeerContext {
    pub config: NodeConfig,
    pub device_id: DeviceId,
    pub keypair: Arc<Secp256k1KeyPair>,
    pub time_source: Arc<dyn TimeSource>,

    pub block_store: Arc<RwLock<BlockStoreService>>,
    pub chain: Arc<ChainAssembler>,
    pub ledger: ChainLedger,
    pub crdt: Arc<RwLock<CrdtEngine>>,
    pub registry: Arc<RwLock<PeerRegistry>>,
    pub consensus: Arc<Mutex<ConsensusService>>,
    pub messaging: Arc<MessagingService>,

    pub event_bus: Arc<InMemoryEventBus>,
    /// Newest model update per device.
    pub models: RwLock<BTreeMap<DeviceId, ModelUpdate>>,
    pub pending_syncs: PendingSyncs,
}

impl PeerContext {
    /// Open every store and wire the components.
    pub fn build(
        config: NodeConfig,
        keypair: Secp256k1KeyPair,
        transport: Arc<dyn PeerTransport>,
        time_source: Arc<dyn TimeSource>,
    ) -> NodeResult<Self> {
        config.validate()?;
        let device_id = DeviceId::new(config.identity.device_id.clone());
        let keypair = Arc::new(keypair);
        let storage = &config.storage;

        // Level 0: registry, seeded with ourselves and the configured peers.
        let mut registry = PeerRegistry::open(
            device_id.clone(),
            open_store(storage, STORE_REGISTRY)?,
            time_source.clone(),
            config.registry.clone(),
        )?;
        registry.register(device_id.clone(), &keypair.public_key(), config.identity.role)?;
        for seed in &config.peers {
            let key = Secp256k1PublicKey::from_hex(&seed.public_key).map_err(|e| {
                ConfigError::Invalid(format!("public key of peer {}: {}", seed.device_id, e))
            })?;
            registry.register(DeviceId::new(seed.device_id.clone()), &key, seed.role)?;
        }
        let registry = Arc::new(RwLock::new(registry));
        let directory = RegistryDirectory::new(registry.clone());

        // Level 1: storage-backed components.
        let block_store = Arc::new(RwLock::new(BlockStoreService::open(
            open_store(storage, STORE_BLOCKS)?,
            time_source.clone(),
            config.block_store.clone(),
        )?));
        let chain = Arc::new(ChainAssembler::new(
            config.chain.clone(),
            Arc::new(directory.clone()),
        ));
        let ledger = ChainLedger::new(block_store.clone(), chain.clone());
        let crdt = Arc::new(RwLock::new(CrdtEngine::open(
            device_id.clone(),
            open_store(storage, STORE_CRDT)?,
            time_source.clone(),
        )?));

        // Level 2: consensus and messaging on top of the adapters.
        let signer: Option<Arc<dyn AuthoritySigner>> = if config.identity.role.is_authority() {
            Some(Arc::new(DeviceSigner::new(device_id.clone(), keypair.clone())))
        } else {
            None
        };
        let consensus = ConsensusService::new(ConsensusDependencies {
            trust: Arc::new(directory.clone()),
            history: Arc::new(ledger.clone()),
            appender: Arc::new(ledger.clone()),
            signer,
            time_source: time_source.clone(),
            config: config.consensus.clone(),
        });
        let messaging = MessagingService::new(MessagingDependencies {
            local_device: device_id.clone(),
            keypair: keypair.clone(),
            store: open_store(storage, STORE_MESSAGES)?,
            transport,
            keys: Arc::new(directory),
            time_source: time_source.clone(),
            config: config.messaging.clone(),
        })?;

        info!(
            "[node] Peer {} ready as {:?} ({} blocks, {} peers known)",
            device_id,
            config.identity.role,
            block_store.read().len(),
            registry.read().len()
        );

        let event_bus = Arc::new(InMemoryEventBus::with_capacity(
            config.network.channel_capacity,
        ));
        Ok(Self {
            config,
            device_id,
            keypair,
            time_source,
            block_store,
            chain,
            ledger,
            crdt,
            registry,
            consensus: Arc::new(Mutex::new(consensus)),
            messaging: Arc::new(messaging),
            event_bus,
            models: RwLock::new(BTreeMap::new()),
            pending_syncs: PendingSyncs::default(),
        })
    }

    /// Encode and send `payload` to `to` through the durable outbox.
    pub async fn send(&self, to: &DeviceId, payload: &Payload) -> NodeResult<SendReceipt> {
        let bytes = payload.encode().map_err(NodeError::Codec)?;
        let receipt = self.messaging.send_message(to, &bytes).await?;
        let event = match receipt.status {
            DeliveryStatus::Failed => "failed",
            _ => "sent",
        };
        MESSAGES.with_label_values(&[event]).inc();
        debug!(
            "[node] Sent {} to {} as {} ({:?})",
            payload.kind(),
            to,
            receipt.message_id,
            receipt.status
        );
        Ok(receipt)
    }

    /// Every registered device except this one.
    pub fn remote_peers(&self) -> Vec<DeviceId> {
        self.registry.read().remote_peers()
    }

    /// Publish on the local bus.
    pub fn emit(&self, event: MeshEvent) {
        self.event_bus.emit(event);
    }
}
