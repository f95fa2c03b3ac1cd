use rusqlite::{params, OptionalExtension, Row};

use super::{Store, StoreError};
use crate::memory::{CaptureSettings, PrivacyRule, RuleStatus, RuleType};

const CAPTURE_SETTINGS_KEY: &str = "capture";

fn conversion_error(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, message.into())
}

fn rule_from_row(row: &Row<'_>) -> rusqlite::Result<PrivacyRule> {
    let rule_type: String = row.get(1)?;
    let status: String = row.get(3)?;

    Ok(PrivacyRule {
        id: row.get(0)?,
        rule_type: RuleType::parse(&rule_type)
            .ok_or_else(|| conversion_error(1, format!("unknown rule type {rule_type}")))?,
        value: row.get(2)?,
        status: RuleStatus::parse(&status)
            .ok_or_else(|| conversion_error(3, format!("unknown rule status {status}")))?,
        created_at: row.get(4)?,
    })
}

impl Store {
    /// Stored capture settings, or defaults when none were saved.
    pub async fn get_settings(&self) -> Result<CaptureSettings, StoreError> {
        let conn = self.conn().await?;
        let raw: Option<String> = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![CAPTURE_SETTINGS_KEY],
                |row| row.get(0),
            )
            .optional()?;

        match raw {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(CaptureSettings::default()),
        }
    }

    pub async fn update_settings(&self, settings: &CaptureSettings) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
            params![CAPTURE_SETTINGS_KEY, serde_json::to_string(settings)?],
        )?;
        Ok(())
    }

    /// Oldest first.
    pub async fn list_privacy_rules(&self) -> Result<Vec<PrivacyRule>, StoreError> {
        let conn = self.conn().await?;
        let mut stmt = conn.prepare(
            "SELECT id, rule_type, value, status, created_at FROM privacy_rules
             ORDER BY created_at ASC, id ASC",
        )?;
        let rules = stmt
            .query_map([], rule_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rules)
    }

    pub async fn add_privacy_rule(&self, rule: &PrivacyRule) -> Result<(), StoreError> {
        let conn = self.conn().await?;
        conn.execute(
            "INSERT OR REPLACE INTO privacy_rules (id, rule_type, value, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                rule.id,
                rule.rule_type.as_str(),
                rule.value,
                rule.status.as_str(),
                rule.created_at,
            ],
        )?;
        Ok(())
    }

    /// Returns false when no rule has this id.
    pub async fn update_privacy_rule(&self, rule: &PrivacyRule) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let updated = conn.execute(
            "UPDATE privacy_rules SET rule_type = ?2, value = ?3, status = ?4 WHERE id = ?1",
            params![
                rule.id,
                rule.rule_type.as_str(),
                rule.value,
                rule.status.as_str(),
            ],
        )?;
        Ok(updated > 0)
    }

    pub async fn delete_privacy_rule(&self, id: &str) -> Result<bool, StoreError> {
        let conn = self.conn().await?;
        let removed = conn.execute("DELETE FROM privacy_rules WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_store::memory_store;

    #[tokio::test]
    async fn test_settings_default_then_persisted() {
        let store = memory_store(3).await;
        assert_eq!(store.get_settings().await.unwrap(), CaptureSettings::default());

        let settings = CaptureSettings {
            enabled: false,
            excluded_domains: vec!["bank.com".to_string()],
            excluded_keywords: vec!["secret".to_string()],
            max_storage_mb: 100,
        };
        store.update_settings(&settings).await.unwrap();
        assert_eq!(store.get_settings().await.unwrap(), settings);
    }

    #[tokio::test]
    async fn test_privacy_rule_crud() {
        let store = memory_store(3).await;
        let mut rule = PrivacyRule::new(RuleType::Keyword, "password");
        rule.created_at = 1;
        let mut other = PrivacyRule::new(RuleType::Domain, "bank.com");
        other.created_at = 2;

        store.add_privacy_rule(&other).await.unwrap();
        store.add_privacy_rule(&rule).await.unwrap();
        assert_eq!(
            store.list_privacy_rules().await.unwrap(),
            vec![rule.clone(), other.clone()]
        );

        rule.status = RuleStatus::Inactive;
        assert!(store.update_privacy_rule(&rule).await.unwrap());
        let listed = store.list_privacy_rules().await.unwrap();
        assert_eq!(listed[0].status, RuleStatus::Inactive);

        assert!(store.delete_privacy_rule(&rule.id).await.unwrap());
        assert!(!store.delete_privacy_rule(&rule.id).await.unwrap());

        let missing = PrivacyRule::new(RuleType::Date, "2024-01-01");
        assert!(!store.update_privacy_rule(&missing).await.unwrap());
    }
}
