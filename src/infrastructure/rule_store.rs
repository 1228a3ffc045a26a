use crate::domain::models::{BlockingRule, ResourceType};
use crate::infrastructure::error::InfraError;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

/// Host-side set of dynamically installed request rules.
#[async_trait]
pub trait DynamicRuleStore: Send + Sync {
    async fn dynamic_rules(&self) -> Result<Vec<BlockingRule>, InfraError>;

    /// Applies removals first, then additions, as one update.
    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockingRule>,
    ) -> Result<(), InfraError>;
}

#[derive(Debug, Default)]
pub struct InMemoryDynamicRuleStore {
    rules: Mutex<BTreeMap<u32, BlockingRule>>,
}

impl InMemoryDynamicRuleStore {
    pub fn rule_count(&self) -> Result<usize, InfraError> {
        Ok(self.lock_rules()?.len())
    }

    /// Where a request would be redirected by the installed rules, if anywhere.
    pub fn redirect_for(
        &self,
        request_url: &str,
        resource_type: ResourceType,
    ) -> Result<Option<String>, InfraError> {
        let rules = self.lock_rules()?;
        Ok(rules
            .values()
            .filter(|rule| rule.condition.matches(request_url, resource_type))
            .max_by_key(|rule| rule.priority)
            .map(|rule| rule.action.redirect.url.clone()))
    }

    fn lock_rules(&self) -> Result<MutexGuard<'_, BTreeMap<u32, BlockingRule>>, InfraError> {
        self.rules
            .lock()
            .map_err(|error| InfraError::RuleUpdate(format!("rule store lock poisoned: {error}")))
    }
}

#[async_trait]
impl DynamicRuleStore for InMemoryDynamicRuleStore {
    async fn dynamic_rules(&self) -> Result<Vec<BlockingRule>, InfraError> {
        Ok(self.lock_rules()?.values().cloned().collect())
    }

    async fn update_dynamic_rules(
        &self,
        remove_rule_ids: Vec<u32>,
        add_rules: Vec<BlockingRule>,
    ) -> Result<(), InfraError> {
        let mut seen = HashSet::new();
        for rule in &add_rules {
            rule.validate().map_err(InfraError::RuleUpdate)?;
            if !seen.insert(rule.id) {
                return Err(InfraError::RuleUpdate(format!(
                    "duplicate rule id {} in update",
                    rule.id
                )));
            }
        }

        let mut rules = self.lock_rules()?;
        let mut next = rules.clone();
        for rule_id in remove_rule_ids {
            next.remove(&rule_id);
        }
        for rule in add_rules {
            if next.contains_key(&rule.id) {
                return Err(InfraError::RuleUpdate(format!(
                    "rule id {} is already installed",
                    rule.id
                )));
            }
            next.insert(rule.id, rule);
        }
        *rules = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BLOCKED_PAGE: &str = "chrome-extension://timer-lock/blocked.html";

    #[tokio::test]
    async fn update_rejects_id_collision_without_partial_apply() {
        let store = InMemoryDynamicRuleStore::default();
        store
            .update_dynamic_rules(vec![], vec![BlockingRule::redirect(1, "*a.com/*", BLOCKED_PAGE)])
            .await
            .expect("install first rule");

        let result = store
            .update_dynamic_rules(
                vec![],
                vec![
                    BlockingRule::redirect(2, "*b.com/*", BLOCKED_PAGE),
                    BlockingRule::redirect(1, "*c.com/*", BLOCKED_PAGE),
                ],
            )
            .await;

        assert!(matches!(result, Err(InfraError::RuleUpdate(_))));
        assert_eq!(store.rule_count().expect("count"), 1);
    }

    #[tokio::test]
    async fn update_removes_before_adding() {
        let store = InMemoryDynamicRuleStore::default();
        store
            .update_dynamic_rules(vec![], vec![BlockingRule::redirect(1, "*a.com/*", BLOCKED_PAGE)])
            .await
            .expect("install");
        store
            .update_dynamic_rules(vec![1], vec![BlockingRule::redirect(1, "*b.com/*", BLOCKED_PAGE)])
            .await
            .expect("replace");

        let rules = store.dynamic_rules().await.expect("rules");
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].condition.url_filter, "*b.com/*");
    }

    #[tokio::test]
    async fn redirect_for_ignores_sub_resources() {
        let store = InMemoryDynamicRuleStore::default();
        store
            .update_dynamic_rules(
                vec![],
                vec![BlockingRule::redirect(1, "*youtube.com/*", BLOCKED_PAGE)],
            )
            .await
            .expect("install");

        assert_eq!(
            store
                .redirect_for("https://www.youtube.com/watch?v=1", ResourceType::MainFrame)
                .expect("evaluate"),
            Some(BLOCKED_PAGE.to_string())
        );
        assert_eq!(
            store
                .redirect_for("https://www.youtube.com/embed/1", ResourceType::SubFrame)
                .expect("evaluate"),
            None
        );
    }
}
