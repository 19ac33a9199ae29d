//! End-to-end tests of the tracker engine with in-process fake connectors
//!
//! Each test opens a fresh SQLite file, wires scripted connectors into a
//! `TrackerEngine` and drives enrichment cycles directly.

#[cfg(test)]
mod tracker_integration_tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use launchtrack::pipeline::blocklist::{BlacklistEntry, BlocklistProvider};
    use launchtrack::pipeline::connectors::pumpfun::LaunchDiscovery;
    use launchtrack::pipeline::connectors::{
        BalanceLeg, Connector, DexObservation, LaunchObservation, RiskObservation,
    };
    use launchtrack::pipeline::db::{SqliteTokenStore, TokenStore};
    use launchtrack::pipeline::engine::{CycleOutcome, SourceSet, TrackerEngine};
    use launchtrack::pipeline::error::{TrackerError, TrackerResult};
    use launchtrack::pipeline::query::{EventFilter, TokenFilter, TokenQuery};
    use launchtrack::pipeline::scheduler::polling_pass;
    use launchtrack::pipeline::table::TokenTable;
    use launchtrack::pipeline::types::{
        BalanceEventKind, BondingCurveStatus, HolderDistribution, PriceChange, SourceKind, TokenStatus,
    };
    use launchtrack::pipeline::TrackerConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;
    use tempfile::NamedTempFile;

    const POPCAT: &str = "7GCihgDB8fe6KNjn2MYtkzZcRjQy3t9GHdC8uHYmW2hr";
    const BONK: &str = "DezXAZ8z7PnrnRJjz3wXBoRgixCa6xjnB7YaB1pPB263";

    /// Connector answering with whatever the test last scripted
    struct Scripted<T> {
        kind: SourceKind,
        answer: Mutex<Option<T>>,
        delay: Duration,
        calls: AtomicUsize,
    }

    impl<T> Scripted<T> {
        fn new(kind: SourceKind, answer: Option<T>) -> Arc<Self> {
            Self::slow(kind, answer, Duration::ZERO)
        }

        fn slow(kind: SourceKind, answer: Option<T>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer: Mutex::new(answer),
                delay,
                calls: AtomicUsize::new(0),
            })
        }

        fn set(&self, answer: Option<T>) {
            *self.answer.lock().unwrap() = answer;
        }
    }

    #[async_trait]
    impl<T: Clone + Send + Sync + 'static> Connector for Scripted<T> {
        type Output = T;

        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn fetch(&self, _address: &str) -> TrackerResult<Option<T>> {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.answer.lock().unwrap().clone())
        }
    }

    struct Failing(SourceKind);

    #[async_trait]
    impl Connector for Failing {
        type Output = RiskObservation;

        fn kind(&self) -> SourceKind {
            self.0
        }

        async fn fetch(&self, _address: &str) -> TrackerResult<Option<RiskObservation>> {
            Err(TrackerError::ConnectorUnavailable {
                kind: self.0,
                reason: "503 Service Unavailable".to_string(),
            })
        }
    }

    struct FixedDiscovery(Vec<String>);

    #[async_trait]
    impl LaunchDiscovery for FixedDiscovery {
        async fn discover(&self, limit: usize) -> TrackerResult<Vec<String>> {
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    fn launch() -> LaunchObservation {
        LaunchObservation {
            symbol: Some("POPCAT".to_string()),
            name: Some("Popcat".to_string()),
            decimals: Some(6),
            market_cap_usd: Some(35_000.0),
            created_timestamp_raw: Some(Utc::now().timestamp_millis() - 3_600_000),
            last_trade_timestamp_raw: Some(Utc::now().timestamp() - 30),
            curve_complete: false,
            withdrawn: false,
            pool_address: None,
            has_social_links: true,
        }
    }

    fn dex() -> DexObservation {
        DexObservation {
            symbol: Some("POPCAT".to_string()),
            name: Some("Popcat".to_string()),
            price_usd: Some(0.000035),
            market_cap_usd: Some(35_500.0),
            liquidity_usd: Some(12_000.0),
            volume_24h_usd: Some(80_000.0),
            price_change: PriceChange {
                m5: Some(1.5),
                h1: Some(12.0),
                h6: Some(40.0),
                h24: Some(40.0),
            },
            pool_address: None,
            pair_created_at_raw: None,
            has_social_links: false,
        }
    }

    fn risk() -> RiskObservation {
        RiskObservation {
            safety_score: Some(72.0),
            rugged: Some(false),
            mint_authority_revoked: Some(true),
            freeze_authority_revoked: Some(true),
            holder_count: Some(340),
            distribution: HolderDistribution {
                top_holder_pct: Some(6.0),
                top10_pct: Some(28.0),
            },
            supply: Some(1_000_000_000.0),
            ..RiskObservation::default()
        }
    }

    struct Harness {
        _file: NamedTempFile,
        store: Arc<dyn TokenStore>,
        engine: TrackerEngine,
    }

    fn harness(sources: SourceSet, configure: impl FnOnce(&mut TrackerConfig)) -> Harness {
        let file = NamedTempFile::new().unwrap();
        let mut config = TrackerConfig {
            db_path: file.path().to_str().unwrap().to_string(),
            ..TrackerConfig::default()
        };
        configure(&mut config);

        let store: Arc<dyn TokenStore> = Arc::new(SqliteTokenStore::open(&config.db_path).unwrap());
        let engine = TrackerEngine::new(&config, sources, Arc::clone(&store), Arc::new(TokenTable::new()));
        Harness {
            _file: file,
            store,
            engine,
        }
    }

    fn full_sources() -> SourceSet {
        SourceSet {
            launch: Some(Scripted::new(SourceKind::LaunchPlatform, Some(launch()))),
            dex: Some(Scripted::new(SourceKind::DexAggregator, Some(dex()))),
            risk: Some(Scripted::new(SourceKind::RiskScanner, Some(risk()))),
            ..SourceSet::default()
        }
    }

    #[tokio::test]
    async fn test_remerge_unchanged_only_touches_updated_at() {
        let h = harness(full_sources(), |_| {});

        let first = h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(
            first,
            CycleOutcome::Updated {
                changed: true,
                significant: true
            }
        );
        let before = h.engine.table().get(POPCAT).unwrap();

        let second = h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(
            second,
            CycleOutcome::Updated {
                changed: false,
                significant: false
            }
        );

        let after = h.engine.table().get(POPCAT).unwrap();
        let mut expected = (*before).clone();
        expected.updated_at = after.updated_at;
        assert_eq!(*after, expected);
        assert!(after.updated_at >= before.updated_at);

        // Only the first merge produced a snapshot
        let history = h
            .store
            .snapshot_history(POPCAT, before.first_discovered_at, Utc::now())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);

        // Persisted row matches the published record
        let stored = h.store.load_tokens().await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0], *after);
    }

    #[tokio::test]
    async fn test_complete_and_pooled_migrates_over_two_cycles() {
        let launch_source = Scripted::new(SourceKind::LaunchPlatform, Some(launch()));
        let sources = SourceSet {
            launch: Some(launch_source.clone()),
            dex: Some(Scripted::new(SourceKind::DexAggregator, Some(dex()))),
            ..SourceSet::default()
        };
        let h = harness(sources, |_| {});

        h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(
            h.engine.table().get(POPCAT).unwrap().bonding_curve_status,
            BondingCurveStatus::Active
        );

        let mut graduated = launch();
        graduated.curve_complete = true;
        graduated.pool_address = Some("FRhB8L7Y9Qq41qZXYLtC2nw8An1RJfLLxRF2x9RwLLMo".to_string());
        launch_source.set(Some(graduated));

        let second = h.engine.enrich(POPCAT).await.unwrap();
        let token = h.engine.table().get(POPCAT).unwrap();
        assert_eq!(token.bonding_curve_status, BondingCurveStatus::Completed);
        assert_eq!(token.raydium_pool_address, None);
        assert!(matches!(second, CycleOutcome::Updated { significant: true, .. }));

        h.engine.enrich(POPCAT).await.unwrap();
        let token = h.engine.table().get(POPCAT).unwrap();
        assert_eq!(token.bonding_curve_status, BondingCurveStatus::Migrated);
        assert_eq!(
            token.raydium_pool_address.as_deref(),
            Some("FRhB8L7Y9Qq41qZXYLtC2nw8An1RJfLLxRF2x9RwLLMo")
        );

        // Stale curve data afterwards never moves it back
        launch_source.set(Some(launch()));
        h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(
            h.engine.table().get(POPCAT).unwrap().bonding_curve_status,
            BondingCurveStatus::Migrated
        );
    }

    #[tokio::test]
    async fn test_duplicate_signatures_store_one_event() {
        let block_time = Utc::now().timestamp() - 120;
        let legs = vec![
            BalanceLeg {
                signature: "5VfydnLu4XwV2H2dLHPv22JxhLbYJruaM9YTaGY30TZjd4re".to_string(),
                wallet: "whale-wallet".to_string(),
                token_mint: Some(POPCAT.to_string()),
                token_amount: 30_000_000.0,
                sol_amount: -42.0,
                block_time_raw: block_time,
                fee_payer: true,
            },
            BalanceLeg {
                signature: "5VfydnLu4XwV2H2dLHPv22JxhLbYJruaM9YTaGY30TZjd4re".to_string(),
                wallet: "curve-vault".to_string(),
                token_mint: Some(POPCAT.to_string()),
                token_amount: -29_900_000.0,
                sol_amount: 42.0,
                block_time_raw: block_time,
                fee_payer: false,
            },
        ];
        let sources = SourceSet {
            balances: Some(Scripted::new(SourceKind::BalanceFeed, Some(legs))),
            ..full_sources()
        };
        let h = harness(sources, |_| {});

        h.engine.enrich(POPCAT).await.unwrap();
        h.engine.enrich(POPCAT).await.unwrap();

        let events = h
            .store
            .balance_events(&EventFilter {
                token_mint: Some(POPCAT.to_string()),
                ..EventFilter::default()
            })
            .await
            .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].wallet, "whale-wallet");
        assert_eq!(events[0].kind, BalanceEventKind::Buy);
        assert!(events[0].is_large_token_amount);

        // 3% of supply: a large buy summarised onto the token
        let token = h.engine.table().get(POPCAT).unwrap();
        assert_eq!(
            token.whale_flags,
            vec![launchtrack::pipeline::types::WhaleFlag::WhaleAccumulation]
        );
    }

    #[tokio::test]
    async fn test_scores_stay_in_range_for_extreme_inputs() {
        let mut wild_dex = dex();
        wild_dex.liquidity_usd = Some(1e30);
        wild_dex.volume_24h_usd = Some(f64::MAX);
        wild_dex.price_change = PriceChange {
            m5: Some(-100.0),
            h1: Some(1e12),
            h6: None,
            h24: Some(-1e12),
        };
        let mut wild_risk = risk();
        wild_risk.safety_score = Some(250.0);
        wild_risk.distribution.top10_pct = Some(-40.0);
        wild_risk.holder_count = Some(50_000_000);

        let sources = SourceSet {
            launch: Some(Scripted::new(SourceKind::LaunchPlatform, Some(launch()))),
            dex: Some(Scripted::new(SourceKind::DexAggregator, Some(wild_dex))),
            risk: Some(Scripted::new(SourceKind::RiskScanner, Some(wild_risk))),
            ..SourceSet::default()
        };
        let h = harness(sources, |_| {});
        h.engine.enrich(POPCAT).await.unwrap();

        let token = h.engine.table().get(POPCAT).unwrap();
        for score in [
            token.invest_score,
            token.rug_score,
            token.early_bonus,
            token.social_bonus,
            token.holders_bonus,
        ] {
            assert!((0.0..=100.0).contains(&score), "score {} out of range", score);
        }
    }

    #[tokio::test]
    async fn test_one_cycle_in_flight_per_address() {
        let slow_launch = Scripted::slow(
            SourceKind::LaunchPlatform,
            Some(launch()),
            Duration::from_millis(200),
        );
        let sources = SourceSet {
            launch: Some(slow_launch.clone()),
            ..SourceSet::default()
        };
        let h = harness(sources, |_| {});

        let (a, b) = tokio::join!(h.engine.enrich(POPCAT), h.engine.enrich(POPCAT));
        let outcomes = [a.unwrap(), b.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == CycleOutcome::InFlight).count(),
            1
        );
        assert_eq!(slow_launch.calls.load(Ordering::SeqCst), 1);

        // Lock released once the cycle finished
        assert!(matches!(
            h.engine.enrich(POPCAT).await.unwrap(),
            CycleOutcome::Updated { .. }
        ));
    }

    #[tokio::test]
    async fn test_timeout_merges_partial_results() {
        let sources = SourceSet {
            launch: Some(Scripted::new(SourceKind::LaunchPlatform, Some(launch()))),
            dex: Some(Scripted::slow(
                SourceKind::DexAggregator,
                Some(dex()),
                Duration::from_secs(5),
            )),
            risk: Some(Arc::new(Failing(SourceKind::RiskScanner))),
            ..SourceSet::default()
        };
        let h = harness(sources, |config| config.cycle_timeout_ms = 100);

        let started = std::time::Instant::now();
        let outcome = h.engine.enrich(POPCAT).await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(matches!(outcome, CycleOutcome::Updated { .. }));

        let token = h.engine.table().get(POPCAT).unwrap();
        assert_eq!(token.symbol.as_deref(), Some("POPCAT"));
        assert_eq!(token.market_cap_usd, Some(35_000.0));
        assert_eq!(token.liquidity_usd, None);
        assert_eq!(token.dex_first_seen_at, None);
        assert_eq!(token.status, TokenStatus::NoDexData);
    }

    #[tokio::test]
    async fn test_untracked_and_invalid_addresses() {
        let sources = SourceSet {
            launch: Some(Scripted::<LaunchObservation>::new(SourceKind::LaunchPlatform, None)),
            ..SourceSet::default()
        };
        let h = harness(sources, |_| {});

        assert_eq!(h.engine.enrich(BONK).await.unwrap(), CycleOutcome::NoData);
        assert!(h.engine.table().is_empty());

        assert!(matches!(
            h.engine.enrich("definitely not a mint").await,
            Err(TrackerError::InvalidAddress(_))
        ));
    }

    #[tokio::test]
    async fn test_blacklist_overrides_status() {
        let h = harness(full_sources(), |_| {});
        h.store
            .block(BlacklistEntry {
                address: POPCAT.to_string(),
                reason: "honeypot".to_string(),
                created_at: Utc::now(),
                expires_at: None,
            })
            .await
            .unwrap();

        h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(
            h.engine.table().get(POPCAT).unwrap().status,
            TokenStatus::Blacklisted
        );

        h.store.unblock(POPCAT).await.unwrap();
        let outcome = h.engine.enrich(POPCAT).await.unwrap();
        assert_eq!(h.engine.table().get(POPCAT).unwrap().status, TokenStatus::Active);
        assert!(matches!(outcome, CycleOutcome::Updated { significant: true, .. }));
    }

    #[tokio::test]
    async fn test_polling_pass_and_queries() {
        let h = harness(full_sources(), |_| {});
        let discovery = FixedDiscovery(vec![
            POPCAT.to_string(),
            BONK.to_string(),
            "bogus".to_string(),
        ]);

        let stats = polling_pass(&h.engine, Some(&discovery), 10, 4).await;
        assert_eq!(stats.discovered, 3);
        assert_eq!(stats.updated, 2);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 0);

        // Tracked tokens are polled again without discovery
        let stats = polling_pass(&h.engine, None, 10, 4).await;
        assert_eq!(stats.discovered, 0);
        assert_eq!(stats.updated, 2);

        let query = TokenQuery::new(Arc::clone(h.engine.table()), Arc::clone(&h.store), 10.0);
        let active = query.tokens(
            &TokenFilter {
                statuses: Some(vec![TokenStatus::Active]),
                min_liquidity_usd: Some(10_000.0),
                ..TokenFilter::default()
            },
            Utc::now(),
        );
        assert_eq!(active.len(), 2);
        assert!(active[0].risk_adjusted_score >= active[1].risk_adjusted_score);

        let view = query.token(BONK, Utc::now()).unwrap();
        assert!(view.age_hours < 1.0);

        let history = query
            .history(POPCAT, Utc::now() - chrono::Duration::hours(1), Utc::now())
            .await
            .unwrap();
        assert_eq!(history.len(), 1);
    }
}
