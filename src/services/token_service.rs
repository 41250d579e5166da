use crate::entities::{prelude::*, upload_tokens};
use chrono::{DateTime, Utc};
use rand::Rng;
use sea_orm::prelude::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter, QueryOrder,
    Set,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use utoipa::ToSchema;
use uuid::Uuid;

const TOKEN_LEN: usize = 48;
const TOKEN_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz-_";

/// Public view of a token row. The hash never leaves this module.
#[derive(Debug, Serialize, ToSchema)]
pub struct TokenSummary {
    pub id: String,
    pub name: String,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastUsedAt")]
    pub last_used_at: Option<DateTime<Utc>>,
    pub revoked: bool,
}

impl From<upload_tokens::Model> for TokenSummary {
    fn from(model: upload_tokens::Model) -> Self {
        Self {
            id: model.id,
            name: model.name,
            created_at: model.created_at,
            last_used_at: model.last_used_at,
            revoked: model.revoked,
        }
    }
}

#[derive(Debug)]
pub struct IssuedToken {
    /// Raw secret, returned to the caller exactly once.
    pub token: String,
    pub record: TokenSummary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedToken {
    pub user_id: String,
    pub token_id: String,
}

pub fn hash_token(raw: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw.as_bytes());
    hex::encode(hasher.finalize())
}

fn generate_token() -> String {
    let mut rng = rand::thread_rng();
    (0..TOKEN_LEN)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

/// Lifecycle of long-lived bearer upload tokens: issue, resolve,
/// revoke, list. Only SHA-256 hashes are persisted.
#[derive(Clone)]
pub struct UploadTokenRegistry {
    db: DatabaseConnection,
}

impl UploadTokenRegistry {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Create a token for `user_id`. The raw value is unrecoverable
    /// after this call returns.
    pub async fn issue(&self, user_id: &str, name: &str) -> Result<IssuedToken, DbErr> {
        let token = generate_token();
        let now = Utc::now();

        let model = upload_tokens::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            user_id: Set(user_id.to_string()),
            name: Set(name.to_string()),
            token_hash: Set(hash_token(&token)),
            created_at: Set(now),
            last_used_at: Set(None),
            revoked: Set(false),
        };

        let inserted = model.insert(&self.db).await?;

        Ok(IssuedToken {
            token,
            record: inserted.into(),
        })
    }

    /// Look up a raw token by its hash. Unknown and revoked tokens
    /// both resolve to `None`. A successful resolution stamps
    /// `last_used_at` on a detached task; the stamp never blocks or
    /// fails the authentication decision.
    pub async fn resolve(&self, raw_token: &str) -> Result<Option<ResolvedToken>, DbErr> {
        let hash = hash_token(raw_token);
        let row = UploadTokens::find()
            .filter(upload_tokens::Column::TokenHash.eq(hash))
            .one(&self.db)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        if row.revoked {
            return Ok(None);
        }

        let resolved = ResolvedToken {
            user_id: row.user_id.clone(),
            token_id: row.id.clone(),
        };

        let db = self.db.clone();
        let token_id = row.id;
        tokio::spawn(async move {
            let stamp = upload_tokens::ActiveModel {
                id: Set(token_id.clone()),
                last_used_at: Set(Some(Utc::now())),
                ..Default::default()
            };
            if let Err(e) = stamp.update(&db).await {
                tracing::warn!("Failed to stamp last_used_at for token {}: {}", token_id, e);
            }
        });

        Ok(Some(resolved))
    }

    /// Soft-delete a token. The ownership filter makes revoking
    /// another user's token a no-op.
    pub async fn revoke(&self, user_id: &str, token_id: &str) -> Result<(), DbErr> {
        UploadTokens::update_many()
            .col_expr(upload_tokens::Column::Revoked, Expr::value(true))
            .filter(upload_tokens::Column::Id.eq(token_id))
            .filter(upload_tokens::Column::UserId.eq(user_id))
            .exec(&self.db)
            .await?;
        Ok(())
    }

    pub async fn list(&self, user_id: &str) -> Result<Vec<TokenSummary>, DbErr> {
        let rows = UploadTokens::find()
            .filter(upload_tokens::Column::UserId.eq(user_id))
            .order_by_desc(upload_tokens::Column::CreatedAt)
            .all(&self.db)
            .await?;

        Ok(rows.into_iter().map(TokenSummary::from).collect())
    }
}
