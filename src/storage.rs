use crate::data::Cast;
use crate::entries::{normalize_entries, AnswerEntry, AnswerStack};
use crate::notify::{OrderListener, OrderSnapshot};
use gloo_net::http::Request;
use gloo_storage::errors::StorageError;
use gloo_storage::{LocalStorage, Storage};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;
use wasm_bindgen_futures::spawn_local;

const STORAGE_PREFIX: &str = "amacaster_order";

/// An answer slot as stored: a bare hash, or the hashes of a stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StoredSlot {
    Single(String),
    Stacked(Vec<String>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderHashes {
    pub second_tier: Vec<String>,
    pub third_tier: Vec<StoredSlot>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredOrder {
    pub cast_hash: String,
    pub order: OrderHashes,
}

impl StoredOrder {
    pub fn from_snapshot(cast_hash: &str, snapshot: &OrderSnapshot) -> Self {
        Self {
            cast_hash: cast_hash.to_owned(),
            order: OrderHashes {
                second_tier: snapshot.questions.iter().map(|q| q.hash.clone()).collect(),
                third_tier: snapshot
                    .answers
                    .iter()
                    .map(|entry| match entry {
                        AnswerEntry::Single(answer) => StoredSlot::Single(answer.hash.clone()),
                        AnswerEntry::Stacked(stack) => StoredSlot::Stacked(
                            stack.answers.iter().map(|a| a.hash.clone()).collect(),
                        ),
                    })
                    .collect(),
            },
        }
    }
}

pub fn storage_key(cast_hash: &str) -> String {
    format!("{}:{}", STORAGE_PREFIX, cast_hash)
}

pub fn load_order(cast_hash: &str) -> Option<StoredOrder> {
    match LocalStorage::get::<StoredOrder>(storage_key(cast_hash)) {
        Ok(order) if order.cast_hash == cast_hash => Some(order),
        Ok(order) => {
            warn!(
                "Ignoring stored order for {} saved under {}",
                order.cast_hash, cast_hash
            );
            None
        }
        Err(StorageError::KeyNotFound(_)) => None,
        Err(err) => {
            warn!("Ignoring unreadable stored order: {}", err);
            None
        }
    }
}

pub fn save_order(order: &StoredOrder) {
    if let Err(err) = LocalStorage::set(storage_key(&order.cast_hash), order) {
        warn!("Failed to persist order: {}", err);
    }
}

pub fn clear_order(cast_hash: &str) {
    LocalStorage::delete(storage_key(cast_hash));
}

#[derive(Debug, Error)]
pub enum OrderStoreError {
    #[error("order store request failed: {0}")]
    Network(#[from] gloo_net::Error),
    #[error("order store answered HTTP {0}")]
    Status(u16),
    #[error("malformed order store response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// The store answers with the saved order itself, or `{"order": null}` when
/// nothing was saved for the thread.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum OrderResponse {
    Saved(OrderHashes),
    Wrapped { order: Option<OrderHashes> },
}

/// Reads an order store response for `cast_hash`.
pub fn parse_remote_order(cast_hash: &str, body: &str) -> Result<Option<StoredOrder>, OrderStoreError> {
    let order = match serde_json::from_str::<OrderResponse>(body)? {
        OrderResponse::Saved(order) => Some(order),
        OrderResponse::Wrapped { order } => order,
    };
    Ok(order.map(|order| StoredOrder {
        cast_hash: cast_hash.to_owned(),
        order,
    }))
}

pub async fn fetch_remote_order(
    endpoint: &str,
    cast_hash: &str,
) -> Result<Option<StoredOrder>, OrderStoreError> {
    let response = Request::get(endpoint)
        .query([("castHash", cast_hash)])
        .send()
        .await?;
    if !response.ok() {
        return Err(OrderStoreError::Status(response.status()));
    }
    let body = response.text().await?;
    parse_remote_order(cast_hash, &body)
}

pub async fn push_remote_order(endpoint: &str, order: &StoredOrder) -> Result<(), OrderStoreError> {
    let response = Request::post(endpoint).json(order)?.send().await?;
    if !response.ok() {
        return Err(OrderStoreError::Status(response.status()));
    }
    Ok(())
}

/// Where orders are kept: always this browser's local storage, and the
/// shared store behind `endpoint` when one is configured.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrderStore {
    endpoint: Option<String>,
}

impl OrderStore {
    pub fn new(endpoint: Option<&str>) -> Self {
        Self {
            endpoint: endpoint.map(str::to_owned),
        }
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// The shared copy wins. Local storage covers a missing or unreachable
    /// store.
    pub async fn load(&self, cast_hash: &str) -> Option<StoredOrder> {
        if let Some(endpoint) = self.endpoint() {
            match fetch_remote_order(endpoint, cast_hash).await {
                Ok(Some(order)) => {
                    info!("restored shared order for {}", cast_hash);
                    return Some(order);
                }
                Ok(None) => debug!("no shared order for {}", cast_hash),
                Err(err) => warn!("order store unavailable, using local copy: {}", err),
            }
        }
        load_order(cast_hash)
    }

    pub fn save(&self, order: StoredOrder) {
        save_order(&order);
        self.push(order);
    }

    /// Drops the local copy and overwrites the shared one with `fresh`.
    pub fn reset(&self, fresh: StoredOrder) {
        clear_order(&fresh.cast_hash);
        self.push(fresh);
    }

    /// Order-change listener that saves every committed snapshot under the
    /// thread's root hash.
    pub fn listener(&self, cast_hash: String) -> OrderListener {
        let store = self.clone();
        Rc::new(move |snapshot: &OrderSnapshot| {
            store.save(StoredOrder::from_snapshot(&cast_hash, snapshot));
        })
    }

    fn push(&self, order: StoredOrder) {
        let Some(endpoint) = self.endpoint.clone() else {
            return;
        };
        spawn_local(async move {
            if let Err(err) = push_remote_order(&endpoint, &order).await {
                warn!("failed to share order for {}: {}", order.cast_hash, err);
            }
        });
    }
}

/// Rebuilds both columns from a stored order. Hashes may sit in either
/// column, since cross-column moves mix them. Unknown hashes are dropped and
/// casts the stored order doesn't mention keep their fetched order at the end
/// of their original column.
pub fn align_order(
    questions: Vec<Cast>,
    answers: Vec<Cast>,
    stored: Option<&StoredOrder>,
) -> (Vec<Cast>, Vec<AnswerEntry>) {
    let Some(stored) = stored else {
        return (questions, answers.into_iter().map(AnswerEntry::Single).collect());
    };

    let question_hashes: Vec<String> = questions.iter().map(|q| q.hash.clone()).collect();
    let answer_hashes: Vec<String> = answers.iter().map(|a| a.hash.clone()).collect();

    let mut pool: HashMap<String, Cast> = questions
        .into_iter()
        .chain(answers)
        .map(|cast| (cast.hash.clone(), cast))
        .collect();

    let mut aligned_questions: Vec<Cast> = stored
        .order
        .second_tier
        .iter()
        .filter_map(|hash| pool.remove(hash))
        .collect();

    let mut aligned_answers = Vec::with_capacity(stored.order.third_tier.len());
    for slot in &stored.order.third_tier {
        match slot {
            StoredSlot::Single(hash) => {
                if let Some(answer) = pool.remove(hash) {
                    aligned_answers.push(AnswerEntry::Single(answer));
                }
            }
            StoredSlot::Stacked(hashes) => {
                let members: Vec<Cast> = hashes.iter().filter_map(|hash| pool.remove(hash)).collect();
                aligned_answers.push(AnswerEntry::Stacked(AnswerStack::from_answers(members)));
            }
        }
    }

    let restored = aligned_questions.len() + aligned_answers.len();
    aligned_questions.extend(question_hashes.iter().filter_map(|hash| pool.remove(hash)));
    aligned_answers.extend(
        answer_hashes
            .iter()
            .filter_map(|hash| pool.remove(hash))
            .map(AnswerEntry::Single),
    );
    debug!(
        "restored stored order for {} ({} slots)",
        stored.cast_hash, restored
    );

    (aligned_questions, normalize_entries(aligned_answers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entries::QaBoard;

    fn cast(hash: &str) -> Cast {
        Cast {
            hash: hash.to_owned(),
            ..Default::default()
        }
    }

    fn casts(hashes: &[&str]) -> Vec<Cast> {
        hashes.iter().map(|hash| cast(hash)).collect()
    }

    fn keys(entries: &[AnswerEntry]) -> Vec<&str> {
        entries.iter().map(AnswerEntry::key).collect()
    }

    #[test]
    fn snapshot_serializes_to_order_shape() {
        let mut board = QaBoard::new(casts(&["q1", "q2"]), casts(&["a1", "a2", "a3"]), true);
        assert!(board.stack(1).is_applied());

        let stored = StoredOrder::from_snapshot("0xroot", &board.snapshot());
        let json = serde_json::to_value(&stored).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "castHash": "0xroot",
                "order": {
                    "secondTier": ["q1", "q2"],
                    "thirdTier": ["a1", ["a2", "a3"]]
                }
            })
        );
    }

    #[test]
    fn align_without_stored_order_keeps_fetch_order() {
        let (questions, answers) = align_order(casts(&["q1", "q2"]), casts(&["a1"]), None);
        assert_eq!(questions, casts(&["q1", "q2"]));
        assert_eq!(keys(&answers), vec!["a1"]);
    }

    #[test]
    fn align_restores_stacks_and_cross_column_moves() {
        let stored = StoredOrder {
            cast_hash: "0xroot".to_owned(),
            order: OrderHashes {
                second_tier: vec!["q2".into(), "a3".into(), "gone".into()],
                third_tier: vec![
                    StoredSlot::Stacked(vec!["a2".into(), "a1".into()]),
                    StoredSlot::Single("q1".into()),
                ],
            },
        };

        let (questions, answers) = align_order(
            casts(&["q1", "q2", "q3"]),
            casts(&["a1", "a2", "a3", "a4"]),
            Some(&stored),
        );

        let question_keys: Vec<_> = questions.iter().map(|q| q.hash.as_str()).collect();
        assert_eq!(question_keys, vec!["q2", "a3", "q3"]);
        assert_eq!(keys(&answers), vec!["stack-a2-a1", "q1", "a4"]);
    }

    #[test]
    fn align_collapses_stacks_that_lost_members() {
        let stored = StoredOrder {
            cast_hash: "0xroot".to_owned(),
            order: OrderHashes {
                second_tier: vec![],
                third_tier: vec![StoredSlot::Stacked(vec!["a1".into(), "deleted".into()])],
            },
        };
        let (_, answers) = align_order(Vec::new(), casts(&["a1", "a2"]), Some(&stored));
        assert_eq!(keys(&answers), vec!["a1", "a2"]);
        assert!(!answers[0].is_stacked());
    }

    #[test]
    fn remote_order_accepts_raw_and_empty_answers() {
        let raw = r#"{"secondTier":["q1"],"thirdTier":["a1",["a2","a3"]]}"#;
        let restored = parse_remote_order("0xroot", raw).unwrap().unwrap();
        assert_eq!(restored.cast_hash, "0xroot");
        assert_eq!(restored.order.second_tier, vec!["q1".to_owned()]);
        assert_eq!(restored.order.third_tier.len(), 2);

        assert_eq!(parse_remote_order("0xroot", r#"{"order":null}"#).unwrap(), None);

        let wrapped = r#"{"order":{"secondTier":[],"thirdTier":["a1"]}}"#;
        let restored = parse_remote_order("0xroot", wrapped).unwrap().unwrap();
        assert_eq!(restored.order.third_tier, vec![StoredSlot::Single("a1".into())]);

        assert!(matches!(
            parse_remote_order("0xroot", "not json"),
            Err(OrderStoreError::Parse(_))
        ));
    }

    #[test]
    fn store_without_endpoint_stays_local() {
        assert_eq!(OrderStore::new(None).endpoint(), None);
        assert_eq!(
            OrderStore::new(Some("/api/save-order")).endpoint(),
            Some("/api/save-order")
        );
    }

    #[test]
    fn stored_order_round_trips_through_json() {
        let json = r#"{"castHash":"0xroot","order":{"secondTier":["q1"],"thirdTier":[["a1","a2"],"a3"]}}"#;
        let stored: StoredOrder = serde_json::from_str(json).unwrap();
        assert_eq!(
            stored.order.third_tier,
            vec![
                StoredSlot::Stacked(vec!["a1".into(), "a2".into()]),
                StoredSlot::Single("a3".into()),
            ]
        );
        assert_eq!(storage_key(&stored.cast_hash), "amacaster_order:0xroot");
    }
}
