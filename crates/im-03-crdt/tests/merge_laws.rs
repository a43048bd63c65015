//! Property tests: every CRDT merge is commutative, associative and idempotent.

use im_03_crdt::{Crdt, GCounter, LwwRegister, OrSet, PnCounter, Tag, VectorClock};
use proptest::prelude::*;
use shared_types::DeviceId;

const DEVICES: [&str; 3] = ["a", "b", "c"];

fn device() -> impl Strategy<Value = DeviceId> {
    (0..DEVICES.len()).prop_map(|i| DeviceId::new(DEVICES[i]))
}

fn pn_counter() -> impl Strategy<Value = PnCounter> {
    prop::collection::vec((device(), -50i64..50), 0..8).prop_map(|ops| {
        let mut c = PnCounter::new();
        for (d, delta) in ops {
            c.add(&d, delta);
        }
        c
    })
}

fn g_counter() -> impl Strategy<Value = GCounter> {
    prop::collection::vec((device(), 0u64..100), 0..8).prop_map(|ops| {
        let mut c = GCounter::new();
        for (d, n) in ops {
            c.increment(&d, n);
        }
        c
    })
}

fn register() -> impl Strategy<Value = LwwRegister<u8>> {
    (any::<u8>(), 0u64..5, device()).prop_map(|(v, ts, d)| LwwRegister::new(v, ts, d))
}

fn or_set() -> impl Strategy<Value = OrSet<u8>> {
    prop::collection::vec((0u8..4, device(), 0u64..6, any::<bool>()), 0..10).prop_map(|ops| {
        let mut s = OrSet::new();
        for (elem, d, ts, remove) in ops {
            if remove {
                s.remove(&elem);
            } else {
                s.add(elem, Tag::new(d, ts));
            }
        }
        s
    })
}

fn vector_clock() -> impl Strategy<Value = VectorClock> {
    prop::collection::vec(device(), 0..6).prop_map(|ticks| {
        let mut c = VectorClock::new();
        for d in ticks {
            c.increment(&d);
        }
        c
    })
}

macro_rules! merge_laws {
    ($name:ident, $strategy:expr) => {
        proptest! {
            #[test]
            fn $name(a in $strategy, b in $strategy, c in $strategy) {
                prop_assert_eq!(a.merged(&b), b.merged(&a));
                prop_assert_eq!(a.merged(&b).merged(&c), a.merged(&b.merged(&c)));
                prop_assert_eq!(a.merged(&a), a.clone());
                prop_assert_eq!(a.merged(&b).merged(&b), a.merged(&b));
            }
        }
    };
}

merge_laws!(test_pn_counter_laws, pn_counter());
merge_laws!(test_g_counter_laws, g_counter());
merge_laws!(test_lww_register_laws, register());
merge_laws!(test_or_set_laws, or_set());
merge_laws!(test_vector_clock_laws, vector_clock());

proptest! {
    #[test]
    fn test_pn_counter_value_is_sum_of_deltas(ops in prop::collection::vec((device(), -50i64..50), 0..20)) {
        let mut c = PnCounter::new();
        let mut expected = 0i64;
        for (d, delta) in ops {
            c.add(&d, delta);
            expected += delta;
        }
        prop_assert_eq!(c.value(), expected);
    }
}
