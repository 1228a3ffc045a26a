use crate::domain::models::BlockingRule;
use crate::infrastructure::config::LockConfig;
use crate::infrastructure::error::InfraError;
use crate::infrastructure::rule_store::DynamicRuleStore;
use std::sync::Arc;
use url::Url;

/// Rule ids are `FIRST_RULE_ID..` in filter order and are reused every cycle.
pub const FIRST_RULE_ID: u32 = 1;

pub struct BlockingRuleManager<B>
where
    B: DynamicRuleStore,
{
    rule_store: Arc<B>,
    url_filters: Vec<String>,
    blocked_page_url: String,
}

impl<B> BlockingRuleManager<B>
where
    B: DynamicRuleStore,
{
    pub fn new(
        rule_store: Arc<B>,
        url_filters: Vec<String>,
        blocked_page_url: &str,
    ) -> Result<Self, InfraError> {
        if url_filters.is_empty() {
            return Err(InfraError::InvalidConfig(
                "at least one blocked url filter is required".to_string(),
            ));
        }
        let blocked_page_url = Url::parse(blocked_page_url).map_err(|error| {
            InfraError::InvalidConfig(format!("invalid blocked page url: {error}"))
        })?;

        Ok(Self {
            rule_store,
            url_filters,
            blocked_page_url: blocked_page_url.to_string(),
        })
    }

    pub fn from_config(rule_store: Arc<B>, config: &LockConfig) -> Result<Self, InfraError> {
        Self::new(
            rule_store,
            config.blocked_url_filters.clone(),
            &config.blocked_page_url,
        )
    }

    pub fn build_rules(&self) -> Vec<BlockingRule> {
        (FIRST_RULE_ID..)
            .zip(&self.url_filters)
            .map(|(id, filter)| BlockingRule::redirect(id, filter, &self.blocked_page_url))
            .collect()
    }

    pub async fn activate(&self) -> Result<(), InfraError> {
        let existing_ids = self.existing_rule_ids().await?;
        let rules = self.build_rules();
        let rule_count = rules.len();
        self.rule_store
            .update_dynamic_rules(existing_ids, rules)
            .await?;
        tracing::info!(rule_count, "blocking rules enabled");
        Ok(())
    }

    pub async fn deactivate(&self) -> Result<(), InfraError> {
        let existing_ids = self.existing_rule_ids().await?;
        if !existing_ids.is_empty() {
            self.rule_store
                .update_dynamic_rules(existing_ids, Vec::new())
                .await?;
        }
        tracing::info!("blocking rules disabled");
        Ok(())
    }

    async fn existing_rule_ids(&self) -> Result<Vec<u32>, InfraError> {
        Ok(self
            .rule_store
            .dynamic_rules()
            .await?
            .into_iter()
            .map(|rule| rule.id)
            .collect())
    }
}
