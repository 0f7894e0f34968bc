//! Last-write-wins model of actor keywords
//!
//! Each (actor, keyword) pair holds the most recently dispatched values.
//! A new broadcast replaces the previous value wholesale; nothing is merged.
//! Only the dispatcher writes to the model; everyone else reads.

use super::value::Scalar;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// The current value of one actor keyword
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordValue {
    /// Actor that broadcast the keyword
    pub actor: String,
    /// Keyword name
    pub keyword: String,
    /// Values in broadcast order
    pub values: Vec<Scalar>,
    /// When the broadcast was dispatched
    pub timestamp: DateTime<Utc>,
}

/// Callback invoked with each new value of a subscribed keyword
pub type Observer = Arc<dyn Fn(&KeywordValue) + Send + Sync>;

/// Handle returned by [`KeywordModel::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type KeyName = (String, String);

#[derive(Default)]
struct ModelInner {
    values: HashMap<KeyName, Arc<KeywordValue>>,
    observers: HashMap<KeyName, Vec<(SubscriptionId, Observer)>>,
    next_subscription: u64,
}

/// Shared keyword model
#[derive(Default)]
pub struct KeywordModel {
    inner: RwLock<ModelInner>,
}

impl KeywordModel {
    /// Create an empty model
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the value of `(actor, keyword)` and notify its observers
    pub(crate) fn update(
        &self,
        actor: &str,
        keyword: &str,
        values: Vec<Scalar>,
    ) -> Arc<KeywordValue> {
        let key = (actor.to_string(), keyword.to_string());
        let value = Arc::new(KeywordValue {
            actor: key.0.clone(),
            keyword: key.1.clone(),
            values,
            timestamp: Utc::now(),
        });

        let observers: Vec<Observer> = {
            let mut inner = self.inner.write();
            inner.values.insert(key.clone(), Arc::clone(&value));
            inner
                .observers
                .get(&key)
                .map(|list| list.iter().map(|(_, obs)| Arc::clone(obs)).collect())
                .unwrap_or_default()
        };

        for observer in observers {
            observer(&value);
        }

        value
    }

    /// Current value of a keyword, or `None` if it has never been broadcast
    pub fn get(&self, actor: &str, keyword: &str) -> Option<Arc<KeywordValue>> {
        let key = (actor.to_string(), keyword.to_string());
        self.inner.read().values.get(&key).cloned()
    }

    /// Current values of a keyword
    pub fn values(&self, actor: &str, keyword: &str) -> Option<Vec<Scalar>> {
        self.get(actor, keyword).map(|value| value.values.clone())
    }

    /// One value of a keyword; `None` if the keyword is absent or too short
    pub fn value(&self, actor: &str, keyword: &str, index: usize) -> Option<Scalar> {
        self.get(actor, keyword)
            .and_then(|value| value.values.get(index).cloned())
    }

    /// Names of all keywords seen from an actor, sorted
    pub fn keywords(&self, actor: &str) -> Vec<String> {
        let inner = self.inner.read();
        let mut names: Vec<String> = inner
            .values
            .keys()
            .filter(|(owner, _)| owner == actor)
            .map(|(_, name)| name.clone())
            .collect();
        names.sort();
        names
    }

    /// Per-actor view of the model
    pub fn actor<'a>(&'a self, actor: &'a str) -> ActorModel<'a> {
        ActorModel { model: self, actor }
    }

    /// Observe every future value of `(actor, keyword)`
    pub fn subscribe<F>(&self, actor: &str, keyword: &str, observer: F) -> SubscriptionId
    where
        F: Fn(&KeywordValue) + Send + Sync + 'static,
    {
        let mut inner = self.inner.write();
        let id = SubscriptionId(inner.next_subscription);
        inner.next_subscription += 1;
        inner
            .observers
            .entry((actor.to_string(), keyword.to_string()))
            .or_default()
            .push((id, Arc::new(observer)));
        id
    }

    /// Remove a subscription; returns false if it was not registered
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut inner = self.inner.write();
        let mut removed = false;
        for list in inner.observers.values_mut() {
            let before = list.len();
            list.retain(|(sub, _)| *sub != id);
            removed |= list.len() != before;
        }
        inner.observers.retain(|_, list| !list.is_empty());
        removed
    }
}

/// Keywords of a single actor
pub struct ActorModel<'a> {
    model: &'a KeywordModel,
    actor: &'a str,
}

impl ActorModel<'_> {
    /// Actor name
    pub fn name(&self) -> &str {
        self.actor
    }

    /// Current value of one of the actor's keywords
    pub fn get(&self, keyword: &str) -> Option<Arc<KeywordValue>> {
        self.model.get(self.actor, keyword)
    }

    /// One value of one of the actor's keywords
    pub fn value(&self, keyword: &str, index: usize) -> Option<Scalar> {
        self.model.value(self.actor, keyword, index)
    }

    /// All keywords seen from this actor
    pub fn keywords(&self) -> Vec<String> {
        self.model.keywords(self.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use proptest::prelude::*;

    #[test]
    fn test_absent_is_not_empty() {
        let model = KeywordModel::new();
        assert!(model.get("tcc", "SlewEnd").is_none());

        model.update("tcc", "SlewEnd", Vec::new());
        let value = model.get("tcc", "SlewEnd").unwrap();
        assert!(value.values.is_empty());
    }

    #[test]
    fn test_update_replaces_previous_value() {
        let model = KeywordModel::new();
        model.update(
            "tcc",
            "AxePos",
            vec![Scalar::Float(-340.009), Scalar::Int(45), Scalar::Float(f64::NAN)],
        );
        model.update("tcc", "AxePos", vec![Scalar::Float(-342.0)]);

        assert_eq!(model.values("tcc", "AxePos").unwrap(), vec![Scalar::Float(-342.0)]);
        assert!(model.value("tcc", "AxePos", 1).is_none());
    }

    #[test]
    fn test_observers_only_see_their_keyword() {
        let model = KeywordModel::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let id = model.subscribe("mcp", "apogeeGang", move |value| {
            sink.lock().push(value.values.clone());
        });

        model.update("mcp", "apogeeGang", vec![Scalar::Int(1)]);
        model.update("mcp", "instrumentNum", vec![Scalar::Int(10)]);
        model.update("tcc", "apogeeGang", vec![Scalar::Int(3)]);
        assert_eq!(seen.lock().len(), 1);

        assert!(model.unsubscribe(id));
        model.update("mcp", "apogeeGang", vec![Scalar::Int(2)]);
        assert_eq!(seen.lock().len(), 1);
        assert!(!model.unsubscribe(id));
    }

    #[test]
    fn test_actor_view() {
        let model = KeywordModel::new();
        model.update("mcp", "instrumentNum", vec![Scalar::Int(10)]);
        model.update("mcp", "apogeeGang", vec![Scalar::Int(1)]);

        let mcp = model.actor("mcp");
        assert_eq!(mcp.keywords(), vec!["apogeeGang", "instrumentNum"]);
        assert_eq!(mcp.value("instrumentNum", 0), Some(Scalar::Int(10)));
        assert!(model.actor("tcc").keywords().is_empty());
    }

    proptest! {
        #[test]
        fn prop_last_write_wins(writes in proptest::collection::vec((0usize..3, proptest::collection::vec(-1000i64..1000, 0..4)), 1..40)) {
            let model = KeywordModel::new();
            let names = ["AxePos", "TCCPos", "SecFocus"];
            let mut expected: HashMap<&str, Vec<Scalar>> = HashMap::new();

            for (slot, ints) in &writes {
                let values: Vec<Scalar> = ints.iter().copied().map(Scalar::Int).collect();
                model.update("tcc", names[*slot], values.clone());
                expected.insert(names[*slot], values);
            }

            for name in names {
                prop_assert_eq!(model.values("tcc", name), expected.get(name).cloned());
            }
        }
    }
}
