//! Crate-level tests for the trading client

#[cfg(test)]
mod tests {
    use crate::api::ApiResult;
    use crate::cache::CacheDb;
    use crate::config::ClientConfig;
    use crate::error::ClientError;
    use crate::live::{AlertSeverity, LiveEvent, LiveUpdate, RiskAlertEvent, StrategyEvent, TradeEvent};
    use crate::repository::PagingConfig;
    use crate::notify::{
        NotificationChannel, NotificationPreferences, NotificationTrigger, Notifier,
        PreferenceStore, TriggerState,
    };
    use crate::types::{NotificationPriority, NotificationRecord, StrategyStatus, TradeSide};
    use futures::StreamExt;
    use rust_decimal::Decimal;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tokio::sync::broadcast;
    use tokio_test::{assert_err, assert_ok};

    /// Captures everything posted to the device
    #[derive(Default)]
    struct RecordingNotifier {
        posted: Mutex<Vec<(NotificationChannel, NotificationRecord)>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        fn channels(&self) -> Vec<NotificationChannel> {
            self.posted.lock().unwrap().iter().map(|(c, _)| *c).collect()
        }
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(
            &self,
            channel: NotificationChannel,
            record: &NotificationRecord,
        ) -> anyhow::Result<()> {
            self.posted.lock().unwrap().push((channel, record.clone()));
            if self.fail {
                anyhow::bail!("notification permission denied");
            }
            Ok(())
        }
    }

    fn trade_update() -> LiveUpdate {
        LiveUpdate::new(LiveEvent::TradeUpdate(TradeEvent {
            trade_id: "t-1".to_string(),
            strategy_id: "s-1".to_string(),
            symbol: "BTC/USDT".to_string(),
            side: TradeSide::Buy,
            quantity: Decimal::new(5, 1),
            price: Decimal::new(64000, 0),
            pnl: None,
        }))
    }

    fn strategy_update() -> LiveUpdate {
        LiveUpdate::new(LiveEvent::StrategyUpdate(StrategyEvent {
            strategy_id: "s-1".to_string(),
            name: Some("Momentum".to_string()),
            status: StrategyStatus::Error,
            message: None,
        }))
    }

    fn risk_update() -> LiveUpdate {
        LiveUpdate::new(LiveEvent::RiskAlert(RiskAlertEvent {
            alert_type: "drawdown".to_string(),
            severity: AlertSeverity::Medium,
            message: "Drawdown at 8%".to_string(),
            strategy_id: Some("s-1".to_string()),
        }))
    }

    async fn setup(
        prefs: NotificationPreferences,
        notifier: RecordingNotifier,
    ) -> (CacheDb, PreferenceStore, Arc<RecordingNotifier>, NotificationTrigger) {
        let cache = CacheDb::open_in_memory().await.unwrap();
        let store = PreferenceStore::in_memory(prefs);
        let notifier = Arc::new(notifier);
        let trigger = NotificationTrigger::new(cache.clone(), notifier.clone(), store.subscribe());
        (cache, store, notifier, trigger)
    }

    #[test]
    fn test_api_result_error_mapping() {
        let unauthorized: ApiResult<()> = ApiResult::error(401, "expired");
        assert!(matches!(unauthorized.into_result(), Err(ClientError::Unauthorized)));

        let offline: ApiResult<()> = ApiResult::error(0, "connection refused");
        let err = offline.into_result().unwrap_err();
        assert!(matches!(err, ClientError::Network(_)));
        assert!(err.is_retryable());

        let timeout: ApiResult<()> = ApiResult::error(408, "timed out");
        assert!(matches!(timeout.into_result(), Err(ClientError::Timeout)));

        let unavailable: ApiResult<()> = ApiResult::error(503, "maintenance");
        assert!(unavailable.is_retryable());
        match unavailable.into_result() {
            Err(ClientError::Api { code, message }) => {
                assert_eq!(code, 503);
                assert_eq!(message, "maintenance");
            }
            other => panic!("unexpected {:?}", other),
        }

        let conflict: ApiResult<()> = ApiResult::error(409, "name taken");
        assert!(!conflict.is_retryable());
        assert_eq!(
            conflict.into_result().unwrap_err().user_message(),
            "name taken"
        );
    }

    #[test]
    fn test_config_paging_bounds() {
        assert_ok!(ClientConfig::default().validate());

        let short_initial = ClientConfig {
            paging: PagingConfig {
                page_size: 10,
                initial_load_size: 5,
                enable_placeholders: false,
            },
            ..Default::default()
        };
        assert_err!(short_initial.validate());

        let zero_page = ClientConfig {
            paging: PagingConfig::with_page_size(0),
            ..Default::default()
        };
        assert_err!(zero_page.validate());
    }

    #[tokio::test]
    async fn test_trigger_records_and_notifies() {
        let (cache, _store, notifier, trigger) =
            setup(NotificationPreferences::default(), RecordingNotifier::default()).await;

        assert!(trigger.handle(&trade_update()).await.unwrap());
        assert!(trigger.handle(&strategy_update()).await.unwrap());
        assert!(trigger.handle(&risk_update()).await.unwrap());
        assert!(!trigger.handle(&LiveUpdate::new(LiveEvent::Connected)).await.unwrap());

        assert_eq!(
            notifier.channels(),
            vec![
                NotificationChannel::Trades,
                NotificationChannel::Strategies,
                NotificationChannel::Alerts
            ]
        );

        let feed = cache.notifications().all().await.unwrap();
        assert_eq!(feed.len(), 3);
        assert_eq!(cache.notifications().unread_count().await.unwrap(), 3);

        let strategy = feed
            .iter()
            .find(|r| r.title == "Strategy Momentum")
            .unwrap();
        assert_eq!(strategy.priority, NotificationPriority::High);
        assert_eq!(strategy.action_url.as_deref(), Some("tradebot://strategies/s-1"));
    }

    #[tokio::test]
    async fn test_global_switch_drops_everything() {
        let prefs = NotificationPreferences {
            enabled: false,
            ..Default::default()
        };
        let (cache, _store, notifier, trigger) = setup(prefs, RecordingNotifier::default()).await;

        assert!(!trigger.handle(&trade_update()).await.unwrap());
        assert!(!trigger.handle(&risk_update()).await.unwrap());

        assert!(notifier.channels().is_empty());
        assert_eq!(cache.notifications().count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_category_switch_only_drops_its_kind() {
        let (cache, store, notifier, trigger) =
            setup(NotificationPreferences::default(), RecordingNotifier::default()).await;

        // Changes apply to the next event without restarting the trigger
        store.set_strategy_enabled(false).unwrap();

        assert!(!trigger.handle(&strategy_update()).await.unwrap());
        assert!(trigger.handle(&trade_update()).await.unwrap());

        assert_eq!(notifier.channels(), vec![NotificationChannel::Trades]);
        assert_eq!(cache.notifications().count().await.unwrap(), 1);

        store.set_alerts_enabled(false).unwrap();
        let error = LiveUpdate::new(LiveEvent::Error {
            message: "Exchange rejected order".to_string(),
            code: Some("E42".to_string()),
        });
        assert!(!trigger.handle(&error).await.unwrap());

        store.set_alerts_enabled(true).unwrap();
        assert!(trigger.handle(&error).await.unwrap());
        assert_eq!(notifier.channels().last(), Some(&NotificationChannel::System));
    }

    #[tokio::test]
    async fn test_notifier_failure_keeps_feed_record() {
        let (cache, _store, notifier, trigger) =
            setup(NotificationPreferences::default(), RecordingNotifier::failing()).await;

        assert!(trigger.handle(&trade_update()).await.unwrap());
        assert_eq!(notifier.channels().len(), 1);
        assert_eq!(cache.notifications().count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_trigger_lifecycle() {
        let (cache, _store, _notifier, trigger) =
            setup(NotificationPreferences::default(), RecordingNotifier::default()).await;
        let (tx, _) = broadcast::channel(16);

        assert_eq!(trigger.state(), TriggerState::Idle);
        assert!(trigger.start(tx.subscribe()));
        assert!(!trigger.start(tx.subscribe()));
        assert!(trigger.is_listening());

        let mut unread = cache.notifications().observe_unread_count();
        assert_eq!(unread.next().await, Some(0));

        tx.send(trade_update()).unwrap();
        let count = tokio::time::timeout(Duration::from_secs(5), unread.next())
            .await
            .unwrap();
        assert_eq!(count, Some(1));

        assert!(trigger.stop());
        assert!(!trigger.stop());
        assert_eq!(trigger.state(), TriggerState::Idle);

        // Restartable after a stop
        assert!(trigger.start(tx.subscribe()));
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), async {
            while trigger.is_listening() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }
}
