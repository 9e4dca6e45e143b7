//! Domain identifiers (strongly-typed IDs).
//!
//! ULID ベースの ID + Phantom type パターン。
//!
//! - **時刻でソート可能**: workflow の作成順に並ぶので、`list()` の結果や
//!   `workflows/` ディレクトリの中身がそのまま時系列になる
//! - **分散生成可能**: 調整なしで複数プロセスから生成できる
//!
//! `Id<T>` は共通実装、`T` はコンパイル時だけ使うマーカー型。
//! `WorkflowId` と `AttemptId` は混同できない。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use std::str::FromStr;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display / FromStr で使うプレフィックス（"wf-", "attempt-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid id '{input}': expected '{prefix}<ulid>'")]
pub struct IdParseError {
    input: String,
    prefix: &'static str,
}

impl<T: IdMarker> FromStr for Id<T> {
    type Err = IdParseError;

    /// Accepts the `Display` form (`wf-01H...`) or a bare ULID.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.strip_prefix(T::prefix()).unwrap_or(s);
        Ulid::from_string(raw)
            .map(Self::from_ulid)
            .map_err(|_| IdParseError {
                input: s.to_string(),
                prefix: T::prefix(),
            })
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Workflow のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Workflow {}

impl IdMarker for Workflow {
    fn prefix() -> &'static str {
        "wf-"
    }
}

/// Attempt のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Attempt {}

impl IdMarker for Attempt {
    fn prefix() -> &'static str {
        "attempt-"
    }
}

/// Identifier of one durable bootstrap workflow instance.
pub type WorkflowId = Id<Workflow>;

/// Identifier of one failed step execution (audit trail).
pub type AttemptId = Id<Attempt>;
