//! GitHub REST v3 access.
//!
//! - client: `ApiClient` / `AuthedFetch`（認証ヘッダ、レート制限の検出）
//! - rate_limit: 429 / 403 の分類と待ち時間の計算
//! - pagination: `Link` ヘッダの追跡
//! - types: ワイヤ型と projection 行への変換

pub mod client;
pub mod error;
pub mod pagination;
pub mod rate_limit;
pub mod types;

pub use client::{ApiClient, AuthedFetch, DEFAULT_BASE_URL};
pub use error::ApiError;
