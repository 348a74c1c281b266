//! Main application orchestration.
//!
//! Wires the session, the feed parser, the executor and the quoting loop
//! together and drives them from one `select!` loop:
//! - Session events and decoded messages
//! - Paper venue feedback (paper mode)
//! - Quoting tick, ticker and account summary polls
//! - Volatility sampling and the periodic state summary

use std::sync::Arc;
use std::time::{Duration, Instant};

use quoter_executor::{DynActionExecutor, PaperExchange, WsActionExecutor};
use quoter_feed::{FeedEvent, SnapshotStore, ThalexParser};
use quoter_mm::{
    FixedVolatility, QuotingEngine, RollingVolatility, SharedVolatility, VolatilitySource,
};
use quoter_telemetry::SummaryReporter;
use quoter_ws::{ConnectionManager, Method, RequestTracker, WsEvent, WsWriteHandle};
use rust_decimal::Decimal;
use serde_json::json;
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{AppConfig, VolatilityMode};
use crate::error::{AppError, AppResult};
use crate::quote_loop::QuoteLoop;

const WS_EVENT_CAPACITY: usize = 1000;
const FEEDBACK_CAPACITY: usize = 1000;

/// Time allowed for the closing requests to be flushed.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Main application.
pub struct Application {
    config: AppConfig,
    paper: bool,
    volatility_override: Option<Decimal>,
    shared_volatility: Option<SharedVolatility>,
}

impl Application {
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            paper: false,
            volatility_override: None,
            shared_volatility: None,
        })
    }

    /// Trade against the in-process paper venue instead of the exchange.
    pub fn with_paper(mut self, paper: bool) -> Self {
        self.paper = paper;
        self
    }

    /// Fixed volatility, ignoring the configured source.
    pub fn with_volatility(mut self, volatility: Decimal) -> Self {
        self.volatility_override = Some(volatility);
        self
    }

    /// Let another task publish volatility. Takes precedence over the
    /// configured source.
    pub fn volatility_publisher(&mut self) -> watch::Sender<Decimal> {
        let (tx, source) = SharedVolatility::channel(self.config.volatility.fixed);
        self.shared_volatility = Some(source);
        tx
    }

    pub fn is_paper(&self) -> bool {
        self.paper
    }

    fn volatility_source(&mut self) -> Box<dyn VolatilitySource> {
        if let Some(shared) = self.shared_volatility.take() {
            return Box::new(shared);
        }
        if let Some(v) = self.volatility_override {
            return Box::new(FixedVolatility::new(v));
        }
        let cfg = &self.config.volatility;
        match cfg.mode {
            VolatilityMode::Fixed => Box::new(FixedVolatility::new(cfg.fixed)),
            VolatilityMode::Rolling => Box::new(RollingVolatility::new(
                cfg.rolling_window,
                cfg.rolling_min_samples,
                cfg.reference_bps,
            )),
        }
    }

    /// Run until Ctrl-C or until the session gives up reconnecting.
    pub async fn run(mut self) -> AppResult<()> {
        let instrument = self.config.instrument.clone();
        let spec = Arc::new(instrument.spec()?);
        let fee_rate_bps = self.config.bookkeeping.fee_rate_bps;

        let mut conn_config = self.config.connection_config();
        if self.paper {
            // Public market data only
            conn_config.login_token = None;
            conn_config.cancel_on_disconnect_secs = None;
            conn_config.private_channels.clear();
        } else if conn_config.login_token.is_none() {
            return Err(AppError::Config(
                "ws.login_token is required for live trading (or run with --paper)".to_string(),
            ));
        }

        info!(
            url = %conn_config.url,
            instrument = %instrument.name,
            label = %instrument.order_label,
            paper = self.paper,
            "Starting quoter"
        );

        let tracker = Arc::new(RequestTracker::new());
        let (ws_tx, mut ws_rx) = mpsc::channel::<WsEvent>(WS_EVENT_CAPACITY);
        let connection = Arc::new(ConnectionManager::new(conn_config, ws_tx, tracker.clone()));
        let handle = connection.write_handle();

        let connection_clone = connection.clone();
        let mut ws_task = tokio::spawn(async move {
            if let Err(e) = connection_clone.connect().await {
                error!(error = %e, "WebSocket connection failed");
            }
        });

        // Paper feedback arrives here; stays silent in live mode.
        let (feedback_tx, mut feedback_rx) = mpsc::channel::<FeedEvent>(FEEDBACK_CAPACITY);
        let paper = self
            .paper
            .then(|| Arc::new(PaperExchange::new(feedback_tx.clone(), fee_rate_bps)));
        let executor: DynActionExecutor = match &paper {
            Some(paper) => paper.clone(),
            None => Arc::new(WsActionExecutor::new(
                handle.clone(),
                instrument.name.clone(),
                instrument.order_label.clone(),
            )),
        };

        let engine = QuotingEngine::new(self.config.quoter.clone(), spec);
        let mut quoter = QuoteLoop::new(
            engine,
            Arc::new(SnapshotStore::new()),
            executor,
            self.volatility_source(),
        );
        if let Some(paper) = paper {
            paper.start().await?;
            quoter = quoter.with_paper(paper);
        }

        let mut parser = ThalexParser::new(
            instrument.name.clone(),
            instrument.order_label.clone(),
            fee_rate_bps,
            tracker,
        );
        let reporter = SummaryReporter::new(instrument.name.clone());

        let mut tick_interval = tokio::time::interval(self.config.tick_interval());
        tick_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ticker_interval = tokio::time::interval(self.config.ticker_interval());
        ticker_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut summary_interval = tokio::time::interval(self.config.account_summary_interval());
        summary_interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut volatility_interval =
            tokio::time::interval(self.config.volatility_update_interval());
        let mut log_interval = tokio::time::interval(self.config.log_interval());

        let ticker_params = json!({ "instrument_name": instrument.name });
        let live = !self.paper;
        let mut ws_finished = false;

        info!("Entering main event loop");
        loop {
            tokio::select! {
                Some(event) = ws_rx.recv() => match event {
                    WsEvent::Session(session) => {
                        if let Err(e) = quoter.on_session(session, Instant::now()).await {
                            warn!(error = %e, "Session event handling error");
                        }
                    }
                    WsEvent::Message(msg) => {
                        for event in parser.handle(&msg) {
                            if let Err(e) = quoter.on_feed_event(event).await {
                                warn!(error = %e, "Feed event handling error");
                            }
                        }
                    }
                },

                Some(event) = feedback_rx.recv() => {
                    if let Err(e) = quoter.on_feed_event(event).await {
                        warn!(error = %e, "Paper feedback handling error");
                    }
                }

                _ = tick_interval.tick() => {
                    if let Err(e) = quoter.tick(Instant::now()).await {
                        warn!(error = %e, "Quoting tick error");
                    }
                }

                _ = ticker_interval.tick() => {
                    poll(&handle, Method::Ticker, ticker_params.clone()).await;
                }

                _ = summary_interval.tick(), if live => {
                    poll(&handle, Method::AccountSummary, json!({})).await;
                }

                _ = volatility_interval.tick() => {
                    quoter.sample_volatility();
                }

                _ = log_interval.tick() => {
                    reporter.log(&quoter.summary());
                }

                result = &mut ws_task => {
                    ws_finished = true;
                    if let Err(e) = result {
                        error!(error = %e, "WebSocket task panicked");
                    }
                    error!("WebSocket connection ended, stopping");
                    break;
                }

                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                    break;
                }
            }
        }

        quoter.shutdown().await;
        // Paper cancellations are reported through the feedback channel.
        while let Ok(event) = feedback_rx.try_recv() {
            if let Err(e) = quoter.on_feed_event(event).await {
                debug!(error = %e, "Late feedback dropped");
            }
        }
        drop(feedback_tx);

        connection.shutdown();
        if !ws_finished && tokio::time::timeout(SHUTDOWN_GRACE, &mut ws_task).await.is_err() {
            warn!("WebSocket did not close in time");
            ws_task.abort();
        }

        info!("Final state:");
        reporter.log(&quoter.summary());
        Ok(())
    }
}

/// Fire a polling request. Skipped while the session is down.
async fn poll(handle: &WsWriteHandle, method: Method, params: serde_json::Value) {
    if !handle.is_connected() {
        return;
    }
    if let Err(e) = handle.send(method, params, None).await {
        debug!(method = %method, error = %e, "Poll not sent");
    }
}
