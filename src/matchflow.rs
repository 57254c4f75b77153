use crate::data::Cast;
use crate::entries::AnswerEntry;
use crate::notify::OrderSnapshot;
use gloo_net::http::Request;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};
use thiserror::Error;

/// One question paired with one individual answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRecord {
    pub question_hash: String,
    pub answer_hash: String,
}

/// Everything handed to the chain: the flattened matches and, for each match,
/// the position of its question at the time the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub root_id: String,
    pub matches: Vec<MatchRecord>,
    pub rankings: Vec<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHandle(pub String);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionStatus {
    Idle,
    Pending,
    Confirmed(TransactionHandle),
    Failed(String),
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SubmitError {
    #[error("there are no matched questions and answers to submit")]
    NoMatches,
    #[error("wrong network: connected to chain {actual}, expected chain {expected}")]
    NetworkMismatch { expected: u64, actual: u64 },
    #[error("chain rejected the submission: {0}")]
    Chain(String),
    #[error("network error: {0}")]
    Network(String),
}

/// Whatever actually talks to the matcher contract.
#[allow(async_fn_in_trait)]
pub trait ChainSubmitter {
    fn chain_id(&self) -> u64;

    async fn submit_matches(
        &self,
        root_id: &str,
        matches: &[MatchRecord],
        rankings: &[u64],
    ) -> Result<TransactionHandle, SubmitError>;
}

/// Flattens the paired rows into match records. A stack of `k` answers under
/// question `i` yields `k` records for that question; rows missing either
/// side are skipped. The returned rankings run parallel to the records.
pub fn flatten_matches(questions: &[Cast], answers: &[AnswerEntry]) -> (Vec<MatchRecord>, Vec<u64>) {
    let mut matches = Vec::new();
    let mut rankings = Vec::new();

    for (position, (question, entry)) in questions.iter().zip(answers).enumerate() {
        for answer in entry.answers() {
            matches.push(MatchRecord {
                question_hash: question.hash.clone(),
                answer_hash: answer.hash.clone(),
            });
            rankings.push(position as u64);
        }
    }

    (matches, rankings)
}

pub fn prepare_submission(root_id: &str, snapshot: &OrderSnapshot) -> Result<Submission, SubmitError> {
    let (matches, rankings) = flatten_matches(&snapshot.questions, &snapshot.answers);
    if matches.is_empty() {
        return Err(SubmitError::NoMatches);
    }

    Ok(Submission {
        root_id: root_id.to_owned(),
        matches,
        rankings,
    })
}

/// Checks the network, then hands the submission to the chain. Errors from
/// the submitter are returned unchanged.
pub async fn submit<S: ChainSubmitter>(
    submitter: &S,
    expected_chain_id: u64,
    submission: &Submission,
) -> Result<TransactionHandle, SubmitError> {
    if submission.matches.is_empty() {
        return Err(SubmitError::NoMatches);
    }

    let actual = submitter.chain_id();
    if actual != expected_chain_id {
        return Err(SubmitError::NetworkMismatch {
            expected: expected_chain_id,
            actual,
        });
    }

    let handle = submitter
        .submit_matches(&submission.root_id, &submission.matches, &submission.rankings)
        .await?;
    info!(
        "submitted {} matches for {}: {}",
        submission.matches.len(),
        submission.root_id,
        handle.0
    );
    Ok(handle)
}

/// The compact form the matcher contract takes: keccak-256 of the root id,
/// keccak-256 of each packed `(question, answer)` pair, and the rankings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainPayload {
    pub ama_id: String,
    pub match_hashes: Vec<String>,
    pub rankings: Vec<u64>,
}

impl ChainPayload {
    pub fn pack(root_id: &str, matches: &[MatchRecord], rankings: &[u64]) -> Self {
        Self {
            ama_id: to_hex(&keccak_hashv(&[root_id.as_bytes()])),
            match_hashes: matches
                .iter()
                .map(|record| {
                    to_hex(&keccak_hashv(&[
                        record.question_hash.as_bytes(),
                        record.answer_hash.as_bytes(),
                    ]))
                })
                .collect(),
            rankings: rankings.to_vec(),
        }
    }
}

fn keccak_hashv(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    for part in parts {
        hasher.update(part);
    }
    let out = hasher.finalize();
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&out[..32]);
    arr
}

fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayReceipt {
    transaction_hash: String,
}

/// What the relay reports about the network it signs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RelayInfo {
    chain_id: u64,
}

/// Posts packed payloads to a relay that signs and sends the transaction.
#[derive(Debug, Clone)]
pub struct RelaySubmitter {
    endpoint: String,
    chain_id: u64,
}

impl RelaySubmitter {
    /// Asks the relay which network it is connected to. The answer is what
    /// `submit` checks against the expected chain.
    pub async fn connect(endpoint: impl Into<String>) -> Result<Self, SubmitError> {
        let endpoint = endpoint.into();
        let response = Request::get(&endpoint)
            .send()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;

        if !response.ok() {
            return Err(SubmitError::Network(format!(
                "relay answered HTTP {} to a network query",
                response.status()
            )));
        }

        let info: RelayInfo = response
            .json()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;
        info!("relay at {} reports chain {}", endpoint, info.chain_id);
        Ok(Self::with_info(endpoint, info))
    }

    fn with_info(endpoint: String, info: RelayInfo) -> Self {
        Self {
            endpoint,
            chain_id: info.chain_id,
        }
    }
}

impl ChainSubmitter for RelaySubmitter {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn submit_matches(
        &self,
        root_id: &str,
        matches: &[MatchRecord],
        rankings: &[u64],
    ) -> Result<TransactionHandle, SubmitError> {
        let payload = ChainPayload::pack(root_id, matches, rankings);
        let response = Request::post(&self.endpoint)
            .json(&payload)
            .map_err(|err| SubmitError::Network(err.to_string()))?
            .send()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;

        if !response.ok() {
            let body = response.text().await.unwrap_or_default();
            warn!("relay answered HTTP {}: {}", response.status(), body);
            return Err(SubmitError::Chain(format!("HTTP {}: {}", response.status(), body)));
        }

        let receipt: RelayReceipt = response
            .json()
            .await
            .map_err(|err| SubmitError::Network(err.to_string()))?;
        Ok(TransactionHandle(receipt.transaction_hash))
    }
}
