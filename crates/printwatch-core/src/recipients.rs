// ── Registered recipient table ──
//
// The durable store behind the registration surface. Reads happen on
// every dispatch decision, writes only when a device (de)registers, so
// the table lives behind an `ArcSwap` snapshot: readers never block,
// mutations rewrite the JSON file atomically and swap a new snapshot in.

use std::path::PathBuf;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::CoreError;
use crate::model::RegisteredRecipient;

/// Read-mostly store of registered push recipients.
pub struct RecipientStore {
    path: PathBuf,
    snapshot: ArcSwap<Vec<RegisteredRecipient>>,
}

impl RecipientStore {
    /// Load the table from `path`. A missing file is an empty table,
    /// not an error -- registration creates it on first write.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let path = path.into();

        let recipients: Vec<RegisteredRecipient> = match std::fs::read_to_string(&path) {
            Ok(contents) => serde_json::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                return Err(CoreError::Storage {
                    path: path.display().to_string(),
                    source: e,
                });
            }
        };

        tracing::debug!(
            path = %path.display(),
            count = recipients.len(),
            "recipient table loaded"
        );

        Ok(Self {
            path,
            snapshot: ArcSwap::from_pointee(recipients),
        })
    }

    // ── Reads ────────────────────────────────────────────────────────

    /// All recipients registered for one printer prefix.
    pub fn for_prefix(&self, prefix: &str) -> Vec<RegisteredRecipient> {
        self.snapshot
            .load()
            .iter()
            .filter(|r| r.printer_prefix == prefix)
            .cloned()
            .collect()
    }

    /// The whole table (cheap snapshot clone).
    pub fn all(&self) -> Arc<Vec<RegisteredRecipient>> {
        self.snapshot.load_full()
    }

    /// The live-activity token registered for a prefix, if any.
    pub fn live_activity_token(&self, prefix: &str) -> Option<String> {
        self.snapshot
            .load()
            .iter()
            .filter(|r| r.printer_prefix == prefix)
            .find_map(|r| r.live_activity_token.clone())
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Add or replace a recipient (keyed by `recipient_id`).
    pub fn register(&self, recipient: RegisteredRecipient) -> Result<(), CoreError> {
        let mut table = (**self.snapshot.load()).clone();
        table.retain(|r| r.recipient_id != recipient.recipient_id);
        table.push(recipient);
        self.persist(table)
    }

    /// Remove every recipient registered for `prefix`.
    /// Returns the number removed.
    pub fn unregister(&self, prefix: &str) -> Result<usize, CoreError> {
        let mut table = (**self.snapshot.load()).clone();
        let before = table.len();
        table.retain(|r| r.printer_prefix != prefix);
        let removed = before - table.len();
        if removed > 0 {
            self.persist(table)?;
        }
        Ok(removed)
    }

    /// Store the live-activity token on every recipient of `prefix`.
    pub fn set_live_activity_token(&self, prefix: &str, token: &str) -> Result<(), CoreError> {
        self.update_tokens(prefix, Some(token.to_owned()))
    }

    /// Drop the live-activity token for `prefix`. Called by the throttle
    /// after the terminal "end" push so no further updates are attempted.
    pub fn clear_live_activity_token(&self, prefix: &str) -> Result<(), CoreError> {
        self.update_tokens(prefix, None)
    }

    fn update_tokens(&self, prefix: &str, token: Option<String>) -> Result<(), CoreError> {
        let mut table = (**self.snapshot.load()).clone();
        let mut touched = false;
        for r in &mut table {
            if r.printer_prefix == prefix && r.live_activity_token != token {
                r.live_activity_token.clone_from(&token);
                touched = true;
            }
        }
        if touched {
            self.persist(table)?;
        }
        Ok(())
    }

    // ── Persistence ──────────────────────────────────────────────────

    /// Write-temp-then-rename so a crash mid-write never truncates the
    /// table, then swap the in-memory snapshot.
    fn persist(&self, table: Vec<RegisteredRecipient>) -> Result<(), CoreError> {
        let storage_err = |e: std::io::Error| CoreError::Storage {
            path: self.path.display().to_string(),
            source: e,
        };

        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let json = serde_json::to_string_pretty(&table)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(storage_err)?;
        std::fs::rename(&tmp, &self.path).map_err(storage_err)?;

        self.snapshot.store(Arc::new(table));
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn temp_store() -> (tempfile::TempDir, RecipientStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecipientStore::load(dir.path().join("recipients.json")).unwrap();
        (dir, store)
    }

    #[test]
    fn missing_file_is_empty_table() {
        let (_dir, store) = temp_store();
        assert!(store.all().is_empty());
    }

    #[test]
    fn register_persists_and_reloads() {
        let (dir, store) = temp_store();
        let r = RegisteredRecipient::new("tok-1", "h2s");
        store.register(r.clone()).unwrap();

        // Fresh store from the same path sees the registration.
        let reloaded = RecipientStore::load(dir.path().join("recipients.json")).unwrap();
        let all = reloaded.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].recipient_id, r.recipient_id);
        assert_eq!(all[0].push_token, "tok-1");
    }

    #[test]
    fn register_same_id_replaces() {
        let (_dir, store) = temp_store();
        let mut r = RegisteredRecipient::new("tok-1", "h2s");
        store.register(r.clone()).unwrap();

        r.push_token = "tok-2".into();
        store.register(r).unwrap();

        let all = store.all();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].push_token, "tok-2");
    }

    #[test]
    fn for_prefix_filters() {
        let (_dir, store) = temp_store();
        store.register(RegisteredRecipient::new("a", "h2s")).unwrap();
        store.register(RegisteredRecipient::new("b", "h2s")).unwrap();
        store.register(RegisteredRecipient::new("c", "p1s")).unwrap();

        assert_eq!(store.for_prefix("h2s").len(), 2);
        assert_eq!(store.for_prefix("p1s").len(), 1);
        assert!(store.for_prefix("x1c").is_empty());
    }

    #[test]
    fn unregister_removes_all_for_prefix() {
        let (_dir, store) = temp_store();
        store.register(RegisteredRecipient::new("a", "h2s")).unwrap();
        store.register(RegisteredRecipient::new("b", "h2s")).unwrap();
        store.register(RegisteredRecipient::new("c", "p1s")).unwrap();

        assert_eq!(store.unregister("h2s").unwrap(), 2);
        assert!(store.for_prefix("h2s").is_empty());
        assert_eq!(store.for_prefix("p1s").len(), 1);
    }

    #[test]
    fn live_activity_token_lifecycle() {
        let (_dir, store) = temp_store();
        store.register(RegisteredRecipient::new("a", "h2s")).unwrap();
        assert!(store.live_activity_token("h2s").is_none());

        store.set_live_activity_token("h2s", "activity-1").unwrap();
        assert_eq!(
            store.live_activity_token("h2s").as_deref(),
            Some("activity-1")
        );

        store.clear_live_activity_token("h2s").unwrap();
        assert!(store.live_activity_token("h2s").is_none());
    }
}
