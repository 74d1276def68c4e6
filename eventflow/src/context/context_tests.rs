//! Tests for scoped state and the context hierarchy.

#[cfg(test)]
mod tests {
    use crate::context::Context;
    use crate::errors::{ContextError, DuplicateKeyError};
    use crate::events::EventType;
    use crate::testing::TestEvent;
    use crate::workflow::Session;
    use pretty_assertions::assert_eq;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    fn session() -> Session<TestEvent> {
        Session::standalone()
    }

    #[test]
    fn test_context_requires_session_or_parent() {
        let err = Context::<TestEvent>::new(None, None).unwrap_err();
        assert_eq!(
            err.to_string(),
            "A session or a parent context is required to create a Context"
        );
    }

    #[test]
    fn test_context_new_variants() {
        let session = session();
        let c1 = Context::new(Some(&session), None).unwrap();
        let c2 = Context::new(None, Some(&c1)).unwrap();
        let c3 = Context::new(Some(&session), Some(&c2)).unwrap();

        assert!(c2.parent().unwrap().ptr_eq(&c1));
        assert!(c3.parent().unwrap().ptr_eq(&c2));
        assert!(c1.parent().is_none());
    }

    #[test]
    fn test_context_rejects_parent_from_other_session() {
        let s1 = session();
        let s2 = session();
        let parent = Context::from_session(&s1);

        assert!(Context::new(Some(&s2), Some(&parent)).is_err());
    }

    #[test]
    fn test_set_global_visible_to_child() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set("test_key", 42);

        let c2 = c1.child();
        assert_eq!(c2.get("test_key").unwrap(), json!(42));
    }

    #[test]
    fn test_set_global_visible_to_unrelated_context_of_session() {
        let session = session();
        let c1 = Context::from_session(&session);
        let c2 = Context::from_session(&session);
        c1.set("shared", "yes");

        assert_eq!(c2.get("shared").unwrap(), json!("yes"));
        assert_eq!(session.store().get("shared"), Some(json!("yes")));
    }

    #[test]
    fn test_set_private_hidden_from_child() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set_private("test_key", 42).unwrap();
        assert_eq!(c1.get("test_key").unwrap(), json!(42));

        let c2 = c1.child();
        let err = c2.get("test_key").unwrap_err();
        assert!(matches!(err, ContextError::PrivacyViolation(ref e) if e.owner == c1.id()));
    }

    #[test]
    fn test_set_private_hidden_from_parent() {
        let session = session();
        let c1 = Context::from_session(&session);
        let c2 = c1.child();
        c2.set_private("secret", 1).unwrap();

        assert!(matches!(
            c1.get("secret"),
            Err(ContextError::PrivacyViolation(_))
        ));
    }

    #[test]
    fn test_privacy_violation_ignores_default() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set_private("secret", 1).unwrap();

        let c2 = c1.child();
        assert!(matches!(
            c2.get_or("secret", 0),
            Err(ContextError::PrivacyViolation(_))
        ));
    }

    #[test]
    fn test_set_private_duplicate_of_global() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set("test_key", 42);

        let c2 = c1.child();
        let err = c2.set_private("test_key", 99).unwrap_err();
        assert_eq!(err, DuplicateKeyError::new("test_key"));
        assert_eq!(c2.get("test_key").unwrap(), json!(42));
        assert!(c2.private_store().is_empty());
    }

    #[test]
    fn test_set_private_duplicate_along_chain() {
        let session = session();
        let root = Context::from_session(&session);
        let middle = root.child();
        let leaf = middle.child();

        root.set_private("k", 1).unwrap();
        assert!(leaf.set_private("k", 2).is_err());

        leaf.set_private("other", 1).unwrap();
        assert!(root.set_private("other", 2).is_err());
        assert!(leaf.set_private("other", 3).is_err());
    }

    #[test]
    fn test_set_private_allowed_on_sibling_branches() {
        let session = session();
        let root = Context::from_session(&session);
        let left = root.child();
        let right = root.child();

        left.set_private("k", "left").unwrap();
        // Siblings do not share an ancestor chain.
        right.set_private("k", "right").unwrap();

        assert_eq!(left.get("k").unwrap(), json!("left"));
        assert_eq!(right.get("k").unwrap(), json!("right"));
    }

    #[test]
    fn test_global_overwrite_allowed() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set("k", 1);
        c1.set("k", 2);
        assert_eq!(c1.get("k").unwrap(), json!(2));
    }

    #[test]
    fn test_get_default_does_not_mutate() {
        let session = session();
        let c1 = Context::from_session(&session);

        assert_eq!(c1.get_or("test_key", 42).unwrap(), json!(42));
        assert!(matches!(c1.get("test_key"), Err(ContextError::KeyNotFound(_))));
        assert!(session.store().is_empty());
    }

    #[test]
    fn test_set_with_flag() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set_with("g", 1, false).unwrap();
        c1.set_with("p", 2, true).unwrap();

        assert!(session.store().contains_key("g"));
        assert!(!session.store().contains_key("p"));
        assert!(c1.private_store().contains_key("p"));
    }

    #[test]
    fn test_typed_access() {
        #[derive(Debug, PartialEq, Serialize, Deserialize)]
        struct Settings {
            retries: u32,
        }

        let session = session();
        let ctx = Context::from_session(&session);
        ctx.set_serialized("settings", &Settings { retries: 3 }).unwrap();

        let settings: Settings = ctx.get_as("settings").unwrap();
        assert_eq!(settings, Settings { retries: 3 });

        ctx.set("bad", "three");
        assert!(matches!(
            ctx.get_as::<Settings>("bad"),
            Err(ContextError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_legacy_data_reads_global() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set("test_key", 42);
        assert_eq!(c1.data()["test_key"], json!(42));
    }

    #[test]
    fn test_legacy_data_writes_are_global() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.data().insert("num_to_collect".to_string(), json!(3));

        let c2 = c1.child();
        assert_eq!(c2.get("num_to_collect").unwrap(), json!(3));
        assert!(c2.set_private("num_to_collect", 1).is_err());
    }

    #[test]
    fn test_legacy_data_read_inside_set() {
        let session = session();
        let c1 = Context::from_session(&session);
        c1.set("a", 1);

        let (tx, rx) = std::sync::mpsc::channel();
        let writer = c1.clone();
        std::thread::spawn(move || {
            writer.set("b", writer.data()["a"].clone());
            let _ = tx.send(());
        });

        assert!(rx.recv_timeout(Duration::from_secs(3)).is_ok());
        assert_eq!(c1.get("b").unwrap(), json!(1));
    }

    #[test]
    fn test_legacy_data_does_not_block_other_contexts() {
        let session = session();
        let c1 = Context::from_session(&session);
        let c2 = c1.child();
        c1.set("a", 1);

        let mut view = c1.data();
        c2.set("b", 2);
        assert!(c2.set_private("c", 3).is_ok());
        view.insert("d", 4);

        assert_eq!(view["a"], json!(1));
        assert_eq!(view["d"], json!(4));
        assert!(!view.contains_key("b"));
        assert_eq!(c2.get("d").unwrap(), json!(4));
    }

    #[test]
    fn test_child_does_not_keep_parent_alive() {
        let session = session();
        let parent = Context::from_session(&session);
        let child = parent.child();
        drop(parent);

        assert!(child.parent().is_none());
    }

    #[test]
    fn test_collect_events_on_context() {
        let session = session();
        let ctx = Context::from_session(&session);
        let required = [TestEvent::ONE, TestEvent::ANOTHER];

        assert_eq!(ctx.collect_events(TestEvent::one("a"), &required), None);
        assert_eq!(ctx.collect_events(TestEvent::Last, &required), None);
        assert_eq!(
            ctx.collect_events(TestEvent::another("b"), &required),
            Some(vec![TestEvent::one("a"), TestEvent::another("b")])
        );
    }

    #[test]
    fn test_collectors_are_per_context() {
        let session = session();
        let c1 = Context::from_session(&session);
        let c2 = c1.child();
        let required: [EventType; 2] = [TestEvent::ONE, TestEvent::ANOTHER];

        assert_eq!(c1.collect_events(TestEvent::one("a"), &required), None);
        assert_eq!(c2.collect_events(TestEvent::another("b"), &required), None);
        assert_eq!(c1.collector().pending(&required), 1);
        assert_eq!(c2.collector().pending(&required), 1);
    }

    #[test]
    fn test_context_session_link() {
        let session = session();
        let ctx = Context::from_session(&session);
        assert_eq!(ctx.session().unwrap().id(), session.id());

        drop(session);
        assert!(ctx.session().is_err());
    }

    #[test]
    fn test_concurrent_private_sets_yield_one_success() {
        let session = session();
        let root = Context::from_session(&session);
        let mut chain = vec![root];
        for _ in 0..7 {
            let next = chain[chain.len() - 1].child();
            chain.push(next);
        }
        let barrier = Arc::new(Barrier::new(chain.len()));

        let handles: Vec<_> = chain
            .iter()
            .cloned()
            .map(|ctx| {
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    ctx.set_private("race", 1).is_ok()
                })
            })
            .collect();

        let successes = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(successes, 1);
    }
}
