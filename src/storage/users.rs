use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redb::ReadableTable;
use std::collections::BTreeMap;
use thiserror::Error;

use super::db::{Database, DatabaseError};
use super::models::UserRecord;
use super::tables::*;
use crate::error::AuthError;
use crate::identity::{NewSubject, Provider};
use crate::subject::SubjectId;
use crate::traits::{PasswordCredentials, PasswordHash, SubjectStatus, UserStore};

/// First id handed out to a locally created subject.
pub const FIRST_SUBJECT_ID: i64 = 10001;

const NEXT_SUBJECT_ID: &str = "next_subject_id";

#[derive(Debug, Error)]
pub enum UserStoreError {
    #[error("{0} is already bound to another subject")]
    Conflict(String),
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Subject {0} not found")]
    NotFound(SubjectId),
}

impl From<UserStoreError> for AuthError {
    fn from(e: UserStoreError) -> Self {
        match e {
            UserStoreError::Conflict(key) => AuthError::AlreadyExists(key),
            UserStoreError::Database(e) => e.into(),
            UserStoreError::NotFound(id) => AuthError::not_found(format!("subject {id}")),
        }
    }
}

// redb's typed errors all funnel into DatabaseError first.
macro_rules! db_err {
    ($($t:ty),*) => {$(
        impl From<$t> for UserStoreError {
            fn from(e: $t) -> Self {
                UserStoreError::Database(e.into())
            }
        }
    )*};
}
db_err!(
    redb::StorageError,
    redb::TableError,
    redb::CommitError,
    redb::TransactionError,
    rmp_serde::decode::Error,
    rmp_serde::encode::Error
);

fn index_key(provider: &Provider, id: &str) -> String {
    format!("{}:{}", provider.key(), id)
}

impl Database {
    // ========================================================================
    // Subject operations
    // ========================================================================

    /// Create a subject and index all of its provider ids atomically.
    pub fn create_user(&self, new: &NewSubject) -> Result<UserRecord, UserStoreError> {
        let write_txn = self.begin_write()?;
        let record = {
            let mut index = write_txn.open_table(PROVIDER_INDEX)?;
            for (provider, id) in &new.provider_ids {
                let key = index_key(provider, id);
                if index.get(key.as_str())?.is_some() {
                    return Err(UserStoreError::Conflict(key));
                }
            }

            let mut meta = write_txn.open_table(META)?;
            let id = meta
                .get(NEXT_SUBJECT_ID)?
                .map(|v| v.value())
                .unwrap_or(FIRST_SUBJECT_ID);
            meta.insert(NEXT_SUBJECT_ID, id + 1)?;

            let provider_ids: BTreeMap<String, String> = new
                .provider_ids
                .iter()
                .map(|(p, ext)| (p.key(), ext.clone()))
                .collect();

            let record = UserRecord {
                app_token: None,
                ban_reason: None,
                banned_until: None,
                created_at: Utc::now(),
                id: SubjectId(id),
                last_active_at: None,
                nickname: new.profile.nickname.clone(),
                password: new.password.clone(),
                portrait: new.profile.portrait.clone(),
                provider_ids,
                role: new.role,
                sex: new.profile.sex,
            };

            for (provider, ext) in &new.provider_ids {
                index.insert(index_key(provider, ext).as_str(), id)?;
            }
            let mut users = write_txn.open_table(USERS)?;
            let data = rmp_serde::to_vec_named(&record)?;
            users.insert(id, data.as_slice())?;
            record
        };
        write_txn.commit()?;

        tracing::debug!(subject_id = %record.id, "Created subject");
        Ok(record)
    }

    pub fn get_user(&self, id: SubjectId) -> Result<Option<UserRecord>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(USERS)?;

        match table.get(id.0)? {
            Some(data) => Ok(Some(rmp_serde::from_slice(data.value())?)),
            None => Ok(None),
        }
    }

    pub fn find_by_provider(
        &self,
        provider: &Provider,
        id: &str,
    ) -> Result<Option<SubjectId>, DatabaseError> {
        let read_txn = self.begin_read()?;
        let table = read_txn.open_table(PROVIDER_INDEX)?;
        Ok(table
            .get(index_key(provider, id).as_str())?
            .map(|v| SubjectId(v.value())))
    }

    /// Apply `f` to a stored subject and write it back.
    pub fn update_user<F>(&self, id: SubjectId, f: F) -> Result<UserRecord, UserStoreError>
    where
        F: FnOnce(&mut UserRecord),
    {
        let write_txn = self.begin_write()?;
        let record = {
            let mut table = write_txn.open_table(USERS)?;
            let mut record: UserRecord = match table.get(id.0)? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => return Err(UserStoreError::NotFound(id)),
            };
            f(&mut record);
            let data = rmp_serde::to_vec_named(&record)?;
            table.insert(id.0, data.as_slice())?;
            record
        };
        write_txn.commit()?;
        Ok(record)
    }

    /// Delete a subject and release its provider ids.
    pub fn delete_user(&self, id: SubjectId) -> Result<bool, DatabaseError> {
        let write_txn = self.begin_write()?;
        let deleted = {
            let mut table = write_txn.open_table(USERS)?;
            let record: Option<UserRecord> = table
                .remove(id.0)?
                .map(|v| rmp_serde::from_slice(v.value()))
                .transpose()?;

            if let Some(ref record) = record {
                let mut index = write_txn.open_table(PROVIDER_INDEX)?;
                for (provider, ext) in &record.provider_ids {
                    index.remove(format!("{provider}:{ext}").as_str())?;
                }
            }
            record.is_some()
        };
        write_txn.commit()?;

        if deleted {
            tracing::debug!(subject_id = %id, "Deleted subject");
        }
        Ok(deleted)
    }

    /// Bind (or rebind) a provider id to an existing subject.
    pub fn bind_provider(
        &self,
        id: SubjectId,
        provider: &Provider,
        external_id: &str,
    ) -> Result<(), UserStoreError> {
        let key = index_key(provider, external_id);
        let write_txn = self.begin_write()?;
        {
            let mut index = write_txn.open_table(PROVIDER_INDEX)?;
            let owner = index.get(key.as_str())?.map(|v| v.value());
            if owner.is_some_and(|owner| owner != id.0) {
                return Err(UserStoreError::Conflict(key));
            }

            let mut users = write_txn.open_table(USERS)?;
            let mut record: UserRecord = match users.get(id.0)? {
                Some(data) => rmp_serde::from_slice(data.value())?,
                None => return Err(UserStoreError::NotFound(id)),
            };

            if let Some(previous) = record
                .provider_ids
                .insert(provider.key(), external_id.to_string())
            {
                index.remove(index_key(provider, &previous).as_str())?;
            }
            index.insert(key.as_str(), id.0)?;

            let data = rmp_serde::to_vec_named(&record)?;
            users.insert(id.0, data.as_slice())?;
        }
        write_txn.commit()?;
        Ok(())
    }

    /// Ban until the given time, or lift the ban with `None`.
    pub fn set_ban(
        &self,
        id: SubjectId,
        until: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> Result<UserRecord, UserStoreError> {
        self.update_user(id, |record| {
            record.banned_until = until;
            record.ban_reason = if until.is_some() { reason } else { None };
        })
    }
}

#[async_trait]
impl UserStore for Database {
    async fn resolve_by_provider_id(
        &self,
        provider: &Provider,
        id: &str,
    ) -> Result<Option<SubjectId>, AuthError> {
        Ok(self.find_by_provider(provider, id)?)
    }

    async fn create_subject(&self, subject: NewSubject) -> Result<SubjectId, AuthError> {
        Ok(self.create_user(&subject)?.id)
    }

    async fn delete_subject(&self, subject: SubjectId) -> Result<(), AuthError> {
        self.delete_user(subject)?;
        Ok(())
    }

    async fn get_role_and_ban_status(
        &self,
        subject: SubjectId,
    ) -> Result<SubjectStatus, AuthError> {
        let record = self
            .get_user(subject)?
            .ok_or_else(|| AuthError::not_found(format!("subject {subject}")))?;

        let banned = record.is_banned_at(Utc::now());
        Ok(SubjectStatus {
            ban_info: banned.then(|| record.ban_info()),
            banned,
            profile: Some(record.profile()),
            role: record.role,
        })
    }

    async fn update_last_active(&self, subject: SubjectId) -> Result<(), AuthError> {
        self.update_user(subject, |record| record.last_active_at = Some(Utc::now()))?;
        Ok(())
    }

    async fn update_stored_token(&self, subject: SubjectId, token: &str) -> Result<(), AuthError> {
        self.update_user(subject, |record| record.app_token = Some(token.to_string()))?;
        Ok(())
    }

    async fn password_credentials(
        &self,
        provider: &Provider,
        id: &str,
    ) -> Result<Option<PasswordCredentials>, AuthError> {
        let Some(subject) = self.find_by_provider(provider, id)? else {
            return Ok(None);
        };
        Ok(self.get_user(subject)?.map(|record| PasswordCredentials {
            password: record.password,
            subject,
        }))
    }

    async fn set_password(
        &self,
        subject: SubjectId,
        password: PasswordHash,
    ) -> Result<(), AuthError> {
        self.update_user(subject, |record| record.password = Some(password))?;
        Ok(())
    }

    async fn bind_provider_id(
        &self,
        subject: SubjectId,
        provider: &Provider,
        id: &str,
    ) -> Result<(), AuthError> {
        Ok(self.bind_provider(subject, provider, id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subject::Role;
    use crate::testutil::setup_db;
    use chrono::Duration;

    #[test]
    fn test_create_assigns_sequential_ids() {
        let (db, _temp) = setup_db();
        let a = db
            .create_user(&NewSubject::new(Provider::Mobile, "13800000001", Role::AppUser))
            .unwrap();
        let b = db
            .create_user(&NewSubject::new(Provider::Mobile, "13800000002", Role::AppUser))
            .unwrap();
        assert_eq!(a.id, SubjectId(FIRST_SUBJECT_ID));
        assert_eq!(b.id, SubjectId(FIRST_SUBJECT_ID + 1));
        assert_eq!(
            db.find_by_provider(&Provider::Mobile, "13800000002").unwrap(),
            Some(b.id)
        );
    }

    #[test]
    fn test_duplicate_provider_id_conflicts() {
        let (db, _temp) = setup_db();
        db.create_user(&NewSubject::new(Provider::Weixin, "union-1", Role::AppUser))
            .unwrap();
        let err = db
            .create_user(&NewSubject::new(Provider::Weixin, "union-1", Role::AppUser))
            .unwrap_err();
        assert!(matches!(err, UserStoreError::Conflict(ref k) if k == "weixin:union-1"));
    }

    #[test]
    fn test_delete_releases_provider_ids() {
        let (db, _temp) = setup_db();
        let record = db
            .create_user(&NewSubject::new(Provider::Qq, "open-1", Role::AppUser))
            .unwrap();
        assert!(db.delete_user(record.id).unwrap());
        assert_eq!(db.find_by_provider(&Provider::Qq, "open-1").unwrap(), None);
        assert!(db.get_user(record.id).unwrap().is_none());
        assert!(!db.delete_user(record.id).unwrap());
    }

    #[test]
    fn test_bind_provider_rebinds_and_conflicts() {
        let (db, _temp) = setup_db();
        let a = db
            .create_user(&NewSubject::new(Provider::Username, "alice", Role::WebUser))
            .unwrap();
        let b = db
            .create_user(&NewSubject::new(Provider::Username, "bob", Role::WebUser))
            .unwrap();

        db.bind_provider(a.id, &Provider::Mobile, "13800000001").unwrap();
        db.bind_provider(a.id, &Provider::Mobile, "13800000009").unwrap();
        assert_eq!(db.find_by_provider(&Provider::Mobile, "13800000001").unwrap(), None);
        assert_eq!(
            db.find_by_provider(&Provider::Mobile, "13800000009").unwrap(),
            Some(a.id)
        );

        let err = db
            .bind_provider(b.id, &Provider::Mobile, "13800000009")
            .unwrap_err();
        assert!(matches!(err, UserStoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_ban_status_follows_expiry() {
        let (db, _temp) = setup_db();
        let record = db
            .create_user(&NewSubject::new(Provider::Mobile, "13800000001", Role::AppUser))
            .unwrap();

        let status = db.get_role_and_ban_status(record.id).await.unwrap();
        assert!(!status.banned);
        assert!(status.ban_info.is_none());

        db.set_ban(record.id, Some(Utc::now() + Duration::hours(1)), Some("spam".into()))
            .unwrap();
        let status = db.get_role_and_ban_status(record.id).await.unwrap();
        assert!(status.banned);
        assert_eq!(status.ban_info.unwrap()["reason"], "spam");

        db.set_ban(record.id, Some(Utc::now() - Duration::hours(1)), None)
            .unwrap();
        assert!(!db.get_role_and_ban_status(record.id).await.unwrap().banned);
    }

    #[tokio::test]
    async fn test_unknown_subject_is_not_found() {
        let (db, _temp) = setup_db();
        let err = db.get_role_and_ban_status(SubjectId(999)).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound(_)));
    }
}
