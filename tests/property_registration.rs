//! Property-based checks over registration and lifetime caching.

use ferrous_ioc::{key_of_type, ContainerOptions, Key, Resolver, ServiceCollection};
use proptest::prelude::*;
use std::sync::Arc;

#[derive(Debug)]
struct TestService {
    id: u32,
}

const NAMES: [&str; 8] = ["alpha", "beta", "gamma", "delta", "epsilon", "zeta", "eta", "theta"];

proptest! {
    #[test]
    fn named_registrations_are_all_reachable(selected in prop::collection::btree_set(0usize..NAMES.len(), 0..NAMES.len())) {
        let mut services = ServiceCollection::new();
        for &i in &selected {
            services.add_instance(TestService { id: i as u32 }).named(NAMES[i]).register().unwrap();
        }
        prop_assert_eq!(services.len(), selected.len());

        let container = services.build();
        for (i, name) in NAMES.iter().enumerate() {
            let resolved = container.resolve_named_sync::<TestService>(*name);
            if selected.contains(&i) {
                prop_assert_eq!(resolved.unwrap().id, i as u32);
            } else {
                prop_assert!(resolved.unwrap_err().is_not_found());
            }
        }
    }

    #[test]
    fn duplicates_are_rejected_and_first_wins(ids in prop::collection::vec(0u32..1000, 1..10)) {
        let mut services = ServiceCollection::new();
        let mut rejected = 0;
        for id in &ids {
            if services.instance(TestService { id: *id }).is_err() {
                rejected += 1;
            }
        }
        prop_assert_eq!(rejected, ids.len() - 1);
        prop_assert_eq!(services.build().resolve_sync::<TestService>().unwrap().id, ids[0]);
    }

    #[test]
    fn with_override_the_last_registration_wins(ids in prop::collection::vec(0u32..1000, 1..10)) {
        let options = ContainerOptions::default().with_allow_override(true);
        let mut services = ServiceCollection::with_options(options).unwrap();
        for id in &ids {
            services.instance(TestService { id: *id }).unwrap();
        }
        prop_assert_eq!(services.len(), 1);
        prop_assert_eq!(services.build().resolve_sync::<TestService>().unwrap().id, *ids.last().unwrap());
    }

    #[test]
    fn transients_are_distinct_and_singletons_shared(resolutions in 2usize..20) {
        let mut services = ServiceCollection::new();
        services.factory(Vec::new(), |_| Ok(TestService { id: 0 })).unwrap();
        services.add_factory(Vec::new(), |_| Ok(String::from("shared"))).singleton().register().unwrap();
        let container = services.build();

        let transients: Vec<Arc<TestService>> =
            (0..resolutions).map(|_| container.resolve_sync::<TestService>().unwrap()).collect();
        for pair in transients.windows(2) {
            prop_assert!(!Arc::ptr_eq(&pair[0], &pair[1]));
        }

        let first = container.resolve_sync::<String>().unwrap();
        for _ in 1..resolutions {
            prop_assert!(Arc::ptr_eq(&first, &container.resolve_sync::<String>().unwrap()));
        }
        prop_assert_eq!(container.singleton_count(), 1);
    }

    #[test]
    fn names_produce_distinct_keys(a in 0usize..NAMES.len(), b in 0usize..NAMES.len()) {
        let left: Key = key_of_type::<TestService>().with_name(Some(NAMES[a]));
        let right: Key = key_of_type::<TestService>().with_name(Some(NAMES[b]));
        prop_assert_eq!(left == right, a == b);
        prop_assert!(left != key_of_type::<TestService>());
    }
}
