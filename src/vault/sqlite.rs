use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::sea_query::OnConflict;
use sea_orm::{ActiveModelBehavior, ColumnTrait, EntityTrait, QueryFilter, Set};

use crate::database::Database;
use crate::entities::credential;
use crate::vault::{CredentialRecord, SubjectKind, TokenVault, VaultError};

/// Vault backed by the `credential` table.
pub struct SqliteTokenVault {
    db: Arc<Database>,
}

impl SqliteTokenVault {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    async fn upsert(
        &self,
        kind: SubjectKind,
        subject: &str,
        owner: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        let model = credential::ActiveModel {
            subject_id: Set(subject.to_string()),
            subject_kind: Set(kind.as_str().to_string()),
            owner_id: Set(owner.to_string()),
            access_token: Set(access_ct.to_string()),
            refresh_token: Set(refresh_ct.to_string()),
            expires_at: Set(expires_at.timestamp()),
            ..credential::ActiveModel::new()
        };

        credential::Entity::insert(model)
            .on_conflict(
                OnConflict::columns([credential::Column::SubjectId, credential::Column::SubjectKind])
                    .update_columns([
                        credential::Column::OwnerId,
                        credential::Column::AccessToken,
                        credential::Column::RefreshToken,
                        credential::Column::ExpiresAt,
                        credential::Column::UpdatedAt,
                    ])
                    .to_owned(),
            )
            .exec(&self.db.conn)
            .await?;

        tracing::debug!("Stored {} credential for {}", kind, subject);
        Ok(())
    }

    async fn find(
        &self,
        kind: SubjectKind,
        subject: &str,
    ) -> Result<Option<CredentialRecord>, VaultError> {
        let model = credential::Entity::find()
            .filter(credential::Column::SubjectId.eq(subject))
            .filter(credential::Column::SubjectKind.eq(kind.as_str()))
            .one(&self.db.conn)
            .await?;

        Ok(model.map(|model| into_record(model, kind)))
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::UNIX_EPOCH)
}

fn into_record(model: credential::Model, kind: SubjectKind) -> CredentialRecord {
    CredentialRecord {
        subject_id: model.subject_id,
        subject_kind: kind,
        owner_id: model.owner_id,
        encrypted_access_token: model.access_token,
        encrypted_refresh_token: model.refresh_token,
        expires_at: timestamp(model.expires_at),
        updated_at: timestamp(model.updated_at),
    }
}

#[async_trait::async_trait]
impl TokenVault for SqliteTokenVault {
    async fn put_user(
        &self,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.upsert(SubjectKind::User, subject, subject, access_ct, refresh_ct, expires_at)
            .await
    }

    async fn get_user(&self, subject: &str) -> Result<Option<CredentialRecord>, VaultError> {
        self.find(SubjectKind::User, subject).await
    }

    async fn put_session(
        &self,
        session: &str,
        subject: &str,
        access_ct: &str,
        refresh_ct: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), VaultError> {
        self.upsert(SubjectKind::Session, session, subject, access_ct, refresh_ct, expires_at)
            .await
    }

    async fn get_session(&self, session: &str) -> Result<Option<CredentialRecord>, VaultError> {
        self.find(SubjectKind::Session, session).await
    }

    async fn delete_session(&self, session: &str) -> Result<(), VaultError> {
        credential::Entity::delete_many()
            .filter(credential::Column::SubjectId.eq(session))
            .filter(credential::Column::SubjectKind.eq(SubjectKind::Session.as_str()))
            .exec(&self.db.conn)
            .await?;
        Ok(())
    }

    async fn delete_user(&self, subject: &str) -> Result<(), VaultError> {
        let result = credential::Entity::delete_many()
            .filter(credential::Column::OwnerId.eq(subject))
            .exec(&self.db.conn)
            .await?;
        tracing::info!(
            "Deleted {} credential records owned by {}",
            result.rows_affected,
            subject
        );
        Ok(())
    }
}
