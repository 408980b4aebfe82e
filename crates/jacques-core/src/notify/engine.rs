//! Notification Engine (spec §4.10): threshold/cooldown-gated emission of
//! [`NotificationItem`]s, with a bounded in-memory history.

use std::collections::{HashMap, HashSet, VecDeque};

use ulid::Ulid;

use jacques_protocol::{NotificationCategory, NotificationItem, NotificationPriority, NotificationSettings};

const HISTORY_CAP: usize = 100;

fn cooldown_ms(category: NotificationCategory) -> i64 {
    match category {
        NotificationCategory::Context => 2 * 60_000,
        NotificationCategory::Operation => 10 * 60_000,
        NotificationCategory::Plan => 60_000,
        NotificationCategory::AutoCompact => 5 * 60_000,
        NotificationCategory::Handoff => 5 * 60_000,
        NotificationCategory::BugAlert => 5 * 60_000,
    }
}

pub struct NotificationEngine {
    settings: NotificationSettings,
    last_fired: HashMap<(NotificationCategory, String), i64>,
    history: VecDeque<NotificationItem>,
    crossed_thresholds: HashMap<String, HashSet<u8>>,
    bug_alert_counts: HashMap<String, u32>,
}

impl NotificationEngine {
    pub fn new(settings: NotificationSettings) -> Self {
        Self {
            settings,
            last_fired: HashMap::new(),
            history: VecDeque::new(),
            crossed_thresholds: HashMap::new(),
            bug_alert_counts: HashMap::new(),
        }
    }

    pub fn update_settings(&mut self, settings: NotificationSettings) {
        self.settings = settings;
    }

    pub fn settings(&self) -> &NotificationSettings {
        &self.settings
    }

    pub fn history(&self) -> impl Iterator<Item = &NotificationItem> {
        self.history.iter()
    }

    fn category_enabled(&self, category: NotificationCategory) -> bool {
        self.settings.enabled && *self.settings.categories.get(&category).unwrap_or(&false)
    }

    fn should_fire(&mut self, category: NotificationCategory, key: &str, now_ms: i64) -> bool {
        if !self.category_enabled(category) {
            return false;
        }
        let cache_key = (category, key.to_string());
        let cooldown = cooldown_ms(category);
        if let Some(last) = self.last_fired.get(&cache_key) {
            if now_ms - last < cooldown {
                return false;
            }
        }
        self.last_fired.insert(cache_key, now_ms);
        true
    }

    fn record(&mut self, item: NotificationItem) {
        self.history.push_back(item);
        while self.history.len() > HISTORY_CAP {
            self.history.pop_front();
        }
    }

    fn build(
        &self,
        category: NotificationCategory,
        title: String,
        body: String,
        priority: NotificationPriority,
        session_id: Option<String>,
        now_ms: i64,
    ) -> NotificationItem {
        NotificationItem {
            id: Ulid::new().to_string(),
            category,
            title,
            body,
            priority,
            timestamp: now_ms,
            session_id,
        }
    }

    /// Checks a session's new context percentage against the configured
    /// thresholds. Each threshold fires at most once per session lifetime;
    /// crossing several at once (a big jump) can fire more than one item.
    pub fn apply_context_update(
        &mut self,
        session_id: &str,
        used_percentage: f64,
        now_ms: i64,
    ) -> Vec<NotificationItem> {
        let thresholds = self.settings.context_thresholds.clone();
        let mut fired = Vec::new();

        for threshold in thresholds {
            let crossed = self.crossed_thresholds.entry(session_id.to_string()).or_default();
            if used_percentage < threshold as f64 || crossed.contains(&threshold) {
                continue;
            }
            crossed.insert(threshold);

            let key = format!("{}:{}", session_id, threshold);
            if self.should_fire(NotificationCategory::Context, &key, now_ms) {
                fired.push(self.build(
                    NotificationCategory::Context,
                    format!("Context at {}%", threshold),
                    format!("Session has used {}% of its context window.", threshold),
                    if threshold >= 85 {
                        NotificationPriority::High
                    } else {
                        NotificationPriority::Medium
                    },
                    Some(session_id.to_string()),
                    now_ms,
                ));
            }
        }

        for item in &fired {
            self.record(item.clone());
        }
        fired
    }

    pub fn on_operation_complete(
        &mut self,
        session_id: &str,
        token_count: u64,
        now_ms: i64,
    ) -> Option<NotificationItem> {
        if token_count < self.settings.large_operation_threshold {
            return None;
        }
        if !self.should_fire(NotificationCategory::Operation, session_id, now_ms) {
            return None;
        }
        let item = self.build(
            NotificationCategory::Operation,
            "Large operation complete".to_string(),
            format!("Used {} tokens.", token_count),
            NotificationPriority::Low,
            Some(session_id.to_string()),
            now_ms,
        );
        self.record(item.clone());
        Some(item)
    }

    pub fn on_handoff_ready(&mut self, session_id: &str, now_ms: i64) -> Option<NotificationItem> {
        if !self.should_fire(NotificationCategory::Handoff, session_id, now_ms) {
            return None;
        }
        let item = self.build(
            NotificationCategory::Handoff,
            "Handoff ready".to_string(),
            "A handoff document is ready for review.".to_string(),
            NotificationPriority::Medium,
            Some(session_id.to_string()),
            now_ms,
        );
        self.record(item.clone());
        Some(item)
    }

    pub fn on_plan_detected(&mut self, session_id: &str, plan_title: &str, now_ms: i64) -> Option<NotificationItem> {
        let key = format!("{}:{}", session_id, plan_title);
        if !self.should_fire(NotificationCategory::Plan, &key, now_ms) {
            return None;
        }
        let item = self.build(
            NotificationCategory::Plan,
            "Plan detected".to_string(),
            plan_title.to_string(),
            NotificationPriority::Low,
            Some(session_id.to_string()),
            now_ms,
        );
        self.record(item.clone());
        Some(item)
    }

    pub fn on_auto_compact(&mut self, session_id: &str, now_ms: i64) -> Option<NotificationItem> {
        if !self.should_fire(NotificationCategory::AutoCompact, session_id, now_ms) {
            return None;
        }
        let item = self.build(
            NotificationCategory::AutoCompact,
            "Auto-compact triggered".to_string(),
            "The assistant compacted its context automatically.".to_string(),
            NotificationPriority::Low,
            Some(session_id.to_string()),
            now_ms,
        );
        self.record(item.clone());
        Some(item)
    }

    /// Accumulates `is_error=true` tool-result errors since the last alert;
    /// fires and resets the counter once `bug_alert_threshold` is reached.
    pub fn record_tool_error(&mut self, session_id: &str, now_ms: i64) -> Option<NotificationItem> {
        let count = self.bug_alert_counts.entry(session_id.to_string()).or_insert(0);
        *count += 1;

        if *count < self.settings.bug_alert_threshold {
            return None;
        }

        if !self.should_fire(NotificationCategory::BugAlert, session_id, now_ms) {
            return None;
        }

        self.bug_alert_counts.insert(session_id.to_string(), 0);
        let item = self.build(
            NotificationCategory::BugAlert,
            "Repeated tool errors".to_string(),
            "Multiple tool calls have failed in this session.".to_string(),
            NotificationPriority::High,
            Some(session_id.to_string()),
            now_ms,
        );
        self.record(item.clone());
        Some(item)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_crossing_fires_exactly_once_per_threshold() {
        let mut engine = NotificationEngine::new(NotificationSettings::default());

        assert!(engine.apply_context_update("s1", 60.0, 0).is_empty());
        assert_eq!(engine.apply_context_update("s1", 72.0, 1).len(), 1);
        assert!(engine.apply_context_update("s1", 80.0, 2).is_empty());
        assert_eq!(engine.apply_context_update("s1", 90.0, 3).len(), 1);
        assert!(engine.apply_context_update("s1", 82.0, 4).is_empty());
    }

    #[test]
    fn disabled_category_never_fires() {
        let mut settings = NotificationSettings::default();
        settings.categories.insert(NotificationCategory::Operation, false);
        let mut engine = NotificationEngine::new(settings);
        assert!(engine.on_operation_complete("s1", 50_000, 0).is_none());
    }

    #[test]
    fn bug_alert_fires_at_threshold_and_resets() {
        let mut engine = NotificationEngine::new(NotificationSettings {
            enabled: true,
            bug_alert_threshold: 2,
            categories: {
                let mut m = std::collections::HashMap::new();
                m.insert(NotificationCategory::BugAlert, true);
                m
            },
            ..NotificationSettings::default()
        });

        assert!(engine.record_tool_error("s1", 0).is_none());
        assert!(engine.record_tool_error("s1", 1).is_some());
        assert!(engine.record_tool_error("s1", 2).is_none());
    }

    #[test]
    fn cooldown_suppresses_refire_within_window() {
        let mut engine = NotificationEngine::new(NotificationSettings::default());
        assert!(engine.on_handoff_ready("s1", 0).is_some());
        assert!(engine.on_handoff_ready("s1", 1_000).is_none());
        assert!(engine.on_handoff_ready("s1", 5 * 60_000).is_some());
    }

    #[test]
    fn history_is_bounded() {
        let mut engine = NotificationEngine::new(NotificationSettings::default());
        for i in 0..150 {
            engine.on_plan_detected("s1", &format!("plan-{}", i), i as i64 * 70_000);
        }
        assert_eq!(engine.history().count(), HISTORY_CAP);
    }
}
