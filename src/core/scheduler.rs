//! The poll scheduler: the node's main loop.
//!
//! Runs a one-second tick. Every tick it drains queued commands, checks
//! broker connectivity for edges (republishing the birth status when the
//! link comes back), and, once per configured read interval, reads all
//! healthy sensors and publishes the aggregated snapshot. A faulted cycle
//! flashes the error indicator and pauses polling briefly before the loop
//! resumes; only cancellation ends it.
//!
//! Lifecycle: Setup (construction) -> Running (`run` entered) ->
//! ShuttingDown (cancellation observed) -> Stopped (`run` returns).

use std::time::Duration;

use async_trait::async_trait;
use smartsense_mqtt::{
    payload::now_millis, Command, DataPayload, SessionError, TransportSession,
};
use tokio::{sync::mpsc, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    indicators::Indicators,
    sensors::{types::Metric, SensorRegistry},
};

/// Cadence of the scheduler's bookkeeping tick. Command drain and
/// connectivity edges are handled at this resolution; sensor reads are
/// gated separately by the configured read interval.
const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Pause after a faulted cycle before polling resumes.
const FAULT_PAUSE: Duration = Duration::from_secs(5);

/// What the scheduler needs from the broker side. [`TransportSession`] is
/// the production implementation; tests script their own.
#[async_trait]
pub trait Transport: Send {
    fn is_connected(&self) -> bool;

    /// Re-announces the node online. Used on observed reconnects, where the
    /// retained status may still read offline from the last will.
    async fn publish_birth(&self) -> Result<(), SessionError>;

    /// Publishes one cycle's metrics as a single aggregated snapshot.
    async fn publish_metrics(
        &self,
        timestamp: u64,
        metrics: &[Metric],
    ) -> Result<(), SessionError>;
}

#[async_trait]
impl Transport for TransportSession {
    fn is_connected(&self) -> bool {
        TransportSession::is_connected(self)
    }

    async fn publish_birth(&self) -> Result<(), SessionError> {
        self.publish_status(smartsense_mqtt::NodeStatus::Online).await
    }

    async fn publish_metrics(
        &self,
        timestamp: u64,
        metrics: &[Metric],
    ) -> Result<(), SessionError> {
        let mut payload = DataPayload::new(&*self.identity().node_id, timestamp);
        for metric in metrics {
            payload.insert(&*metric.name, metric.value.to_json(), metric.unit);
        }
        self.publish_data(&payload).await
    }
}

// The binary holds the session in an Arc so it can still perform the
// orderly shutdown after the scheduler finishes.
#[async_trait]
impl Transport for std::sync::Arc<TransportSession> {
    fn is_connected(&self) -> bool {
        self.as_ref().is_connected()
    }

    async fn publish_birth(&self) -> Result<(), SessionError> {
        self.as_ref().publish_birth().await
    }

    async fn publish_metrics(
        &self,
        timestamp: u64,
        metrics: &[Metric],
    ) -> Result<(), SessionError> {
        self.as_ref().publish_metrics(timestamp, metrics).await
    }
}

pub struct PollScheduler<T: Transport> {
    registry: SensorRegistry,
    transport: T,
    indicators: Indicators,
    commands: mpsc::Receiver<Command>,
    read_interval: Duration,
    cancel: CancellationToken,
}

impl<T: Transport> PollScheduler<T> {
    pub fn new(
        registry: SensorRegistry,
        transport: T,
        indicators: Indicators,
        commands: mpsc::Receiver<Command>,
        read_interval: Duration,
        cancel: CancellationToken,
    ) -> Self {
        PollScheduler {
            registry,
            transport,
            indicators,
            commands,
            read_interval,
            cancel,
        }
    }

    /// The main loop. Returns only after cancellation, with every sensor
    /// shut down and the indicators dark.
    pub async fn run(mut self) {
        info!(
            sensors = self.registry.healthy_count(),
            interval_secs = self.read_interval.as_secs(),
            "poll scheduler running"
        );

        // The first read happens one full interval after entry; the birth
        // status already tells subscribers the node is up.
        let mut last_read = Instant::now();
        let mut was_connected = self.transport.is_connected();

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = tokio::time::sleep(TICK_INTERVAL) => {}
            }

            if let Err(e) = self.cycle(&mut last_read, &mut was_connected).await {
                error!(error = %e, "poll cycle failed; pausing before retry");
                self.indicators.light.flash_error();
                tokio::select! {
                    _ = self.cancel.cancelled() => break,
                    _ = tokio::time::sleep(FAULT_PAUSE) => {}
                }
            }
        }

        info!("poll scheduler shutting down");
        self.registry.shutdown_all();
        self.indicators.light.off();
        info!("poll scheduler stopped");
    }

    async fn cycle(
        &mut self,
        last_read: &mut Instant,
        was_connected: &mut bool,
    ) -> Result<(), SessionError> {
        while let Ok(command) = self.commands.try_recv() {
            self.handle_command(command);
        }

        let connected = self.transport.is_connected();
        if connected && !*was_connected {
            // An error here leaves the edge unconsumed, so the republish is
            // retried after the fault pause.
            self.transport.publish_birth().await?;
            info!("broker link up; birth status republished");
            self.indicators.light.ok();
        } else if !connected && *was_connected {
            warn!("broker link lost; snapshots will be dropped until it returns");
            self.indicators.light.warning();
        }
        *was_connected = connected;

        if last_read.elapsed() >= self.read_interval {
            let timestamp = now_millis();
            let metrics = self.registry.read_all(timestamp);
            *last_read = Instant::now();

            if metrics.is_empty() {
                warn!("read cycle produced no metrics");
            } else if connected {
                self.transport.publish_metrics(timestamp, &metrics).await?;
                debug!(count = metrics.len(), "snapshot published");
            } else {
                debug!(count = metrics.len(), "link down; snapshot dropped");
            }
        }

        Ok(())
    }

    fn handle_command(&mut self, command: Command) {
        match command.action.as_str() {
            "identify" => {
                info!("identify command received");
                self.indicators.light.info();
                self.indicators.alert.beep();
            }
            other => {
                warn!(action = other, "unknown command action ignored");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::indicators::{AudibleAlert, StatusLight};
    use crate::core::sensors::{
        traits::Sensor,
        types::{Reading, Sample, SensorResult, Value},
    };
    use std::sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    };

    struct TestSensor {
        name: &'static str,
        shutdown_seen: Arc<AtomicBool>,
    }

    impl TestSensor {
        fn new(name: &'static str) -> (Self, Arc<AtomicBool>) {
            let flag = Arc::new(AtomicBool::new(false));
            (
                TestSensor {
                    name,
                    shutdown_seen: flag.clone(),
                },
                flag,
            )
        }
    }

    impl Sensor for TestSensor {
        fn name(&self) -> &'static str {
            self.name
        }
        fn initialize(&mut self) -> SensorResult<()> {
            Ok(())
        }
        fn read(&mut self) -> SensorResult<Reading> {
            self.read_simulated()
        }
        fn read_simulated(&mut self) -> SensorResult<Reading> {
            Ok(vec![Sample::new("temperature", Value::Float(22.5))])
        }
        fn shutdown(&mut self) -> SensorResult<()> {
            self.shutdown_seen.store(true, Ordering::Release);
            Ok(())
        }
        fn unit(&self, _field: &str) -> &'static str {
            "°C"
        }
    }

    #[derive(Clone)]
    struct MockTransport {
        connected: Arc<AtomicBool>,
        fail_births: Arc<AtomicBool>,
        fail_publishes: Arc<AtomicBool>,
        birth_attempts: Arc<AtomicUsize>,
        publish_attempts: Arc<AtomicUsize>,
        births: Arc<AtomicUsize>,
        snapshots: Arc<Mutex<Vec<(u64, Vec<Metric>)>>>,
    }

    impl MockTransport {
        fn new(connected: bool) -> Self {
            MockTransport {
                connected: Arc::new(AtomicBool::new(connected)),
                fail_births: Arc::new(AtomicBool::new(false)),
                fail_publishes: Arc::new(AtomicBool::new(false)),
                birth_attempts: Arc::new(AtomicUsize::new(0)),
                publish_attempts: Arc::new(AtomicUsize::new(0)),
                births: Arc::new(AtomicUsize::new(0)),
                snapshots: Arc::new(Mutex::new(Vec::new())),
            }
        }

        fn set_connected(&self, value: bool) {
            self.connected.store(value, Ordering::Release);
        }

        fn set_fail_births(&self, value: bool) {
            self.fail_births.store(value, Ordering::Release);
        }

        fn set_fail_publishes(&self, value: bool) {
            self.fail_publishes.store(value, Ordering::Release);
        }

        fn snapshot_count(&self) -> usize {
            self.snapshots.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::Acquire)
        }

        async fn publish_birth(&self) -> Result<(), SessionError> {
            self.birth_attempts.fetch_add(1, Ordering::AcqRel);
            if self.fail_births.load(Ordering::Acquire) {
                return Err(SessionError::ConnectTimeout { seconds: 1 });
            }
            self.births.fetch_add(1, Ordering::AcqRel);
            Ok(())
        }

        async fn publish_metrics(
            &self,
            timestamp: u64,
            metrics: &[Metric],
        ) -> Result<(), SessionError> {
            self.publish_attempts.fetch_add(1, Ordering::AcqRel);
            if self.fail_publishes.load(Ordering::Acquire) {
                return Err(SessionError::ConnectTimeout { seconds: 1 });
            }
            self.snapshots
                .lock()
                .unwrap()
                .push((timestamp, metrics.to_vec()));
            Ok(())
        }
    }

    #[derive(Clone)]
    struct RecordingLight(Arc<Mutex<Vec<&'static str>>>);

    impl StatusLight for RecordingLight {
        fn ok(&mut self) {
            self.0.lock().unwrap().push("ok");
        }
        fn warning(&mut self) {
            self.0.lock().unwrap().push("warning");
        }
        fn info(&mut self) {
            self.0.lock().unwrap().push("info");
        }
        fn flash_error(&mut self) {
            self.0.lock().unwrap().push("flash_error");
        }
        fn off(&mut self) {
            self.0.lock().unwrap().push("off");
        }
    }

    struct CountingAlert(Arc<AtomicUsize>);

    impl AudibleAlert for CountingAlert {
        fn beep(&mut self) {
            self.0.fetch_add(1, Ordering::AcqRel);
        }
    }

    fn registry_with(sensor: TestSensor) -> SensorRegistry {
        let mut registry = SensorRegistry::empty_for_tests();
        registry.register(Box::new(sensor), true);
        registry
    }

    fn scheduler(
        registry: SensorRegistry,
        transport: MockTransport,
        commands: mpsc::Receiver<Command>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> PollScheduler<MockTransport> {
        PollScheduler::new(
            registry,
            transport,
            Indicators::silent(),
            commands,
            interval,
            cancel,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn publishes_once_per_read_interval() {
        let mut registry = SensorRegistry::empty_for_tests();
        registry.register(Box::new(crate::core::sensors::pms5003::Pms5003::new()), true);
        registry.register(Box::new(crate::core::sensors::bme680::Bme680::new()), true);

        let transport = MockTransport::new(true);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry,
                transport.clone(),
                rx,
                Duration::from_secs(5),
                cancel.clone(),
            )
            .run(),
        );

        // 11 seconds covers the reads at t=5 and t=10 and no more.
        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(transport.snapshot_count(), 2);
        let snapshots = transport.snapshots.lock().unwrap();
        for (timestamp, metrics) in snapshots.iter() {
            let pm2_5 = metrics.iter().find(|m| m.name == "pms5003/pm2_5").unwrap();
            assert_eq!(pm2_5.unit, "µg/m³");
            let temperature = metrics
                .iter()
                .find(|m| m.name == "bme680/temperature")
                .unwrap();
            assert_eq!(temperature.unit, "°C");
            for metric in metrics {
                assert_eq!(metric.timestamp, *timestamp);
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn no_read_before_the_first_interval_elapses() {
        let (sensor, _) = TestSensor::new("scd40");
        let transport = MockTransport::new(true);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(5),
                cancel.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(4)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(transport.snapshot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn birth_republishes_once_per_reconnect() {
        let (sensor, _) = TestSensor::new("bh1750");
        let transport = MockTransport::new(false);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(60),
                cancel.clone(),
            )
            .run(),
        );

        // Disconnected: no birth, however many ticks pass.
        tokio::time::sleep(Duration::from_secs(3)).await;
        assert_eq!(transport.births.load(Ordering::Acquire), 0);

        // Link up: exactly one birth, not one per tick.
        transport.set_connected(true);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.births.load(Ordering::Acquire), 1);

        // Bounce the link: one more.
        transport.set_connected(false);
        tokio::time::sleep(Duration::from_secs(2)).await;
        transport.set_connected(true);
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(transport.births.load(Ordering::Acquire), 2);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn snapshots_are_dropped_while_disconnected() {
        let (sensor, _) = TestSensor::new("pms5003");
        let transport = MockTransport::new(false);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(5),
                cancel.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(11)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(transport.snapshot_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_publish_pauses_without_bursting_or_rebirthing() {
        let (sensor, _) = TestSensor::new("scd40");
        let transport = MockTransport::new(true);
        transport.set_fail_publishes(true);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(5),
                cancel.clone(),
            )
            .run(),
        );

        // The t=5 read attempts one publish, fails, and triggers the fault
        // pause. The failed snapshot is not delivered, and a publish failure
        // on a live link is not a reconnect, so no birth goes out.
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.publish_attempts.load(Ordering::Acquire), 1);
        assert_eq!(transport.snapshot_count(), 0);
        assert_eq!(transport.birth_attempts.load(Ordering::Acquire), 0);

        // Once the transport recovers, the next attempt comes only after
        // the fault pause and a fresh interval; the failed cycle advanced
        // the read clock, so there is no burst of catch-up publishes.
        transport.set_fail_publishes(false);
        tokio::time::sleep(Duration::from_secs(7)).await;
        assert_eq!(transport.publish_attempts.load(Ordering::Acquire), 2);
        assert_eq!(transport.snapshot_count(), 1);
        assert_eq!(transport.birth_attempts.load(Ordering::Acquire), 0);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_birth_is_retried_after_the_fault_pause() {
        let (sensor, _) = TestSensor::new("bh1750");
        let transport = MockTransport::new(false);
        transport.set_fail_births(true);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(60),
                cancel.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        transport.set_connected(true);

        // The t=3 tick sees the reconnect edge and the birth fails; the edge
        // stays unconsumed behind the fault pause.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(transport.birth_attempts.load(Ordering::Acquire), 1);
        assert_eq!(transport.births.load(Ordering::Acquire), 0);

        // After the pause the same edge drives exactly one more attempt,
        // which now lands.
        transport.set_fail_births(false);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(transport.birth_attempts.load(Ordering::Acquire), 2);
        assert_eq!(transport.births.load(Ordering::Acquire), 1);

        // A settled link produces no further births.
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(transport.births.load(Ordering::Acquire), 1);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_shuts_sensors_down() {
        let (sensor, shutdown_seen) = TestSensor::new("bme680");
        let transport = MockTransport::new(true);
        let (_tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let task = tokio::spawn(
            scheduler(
                registry_with(sensor),
                transport.clone(),
                rx,
                Duration::from_secs(5),
                cancel.clone(),
            )
            .run(),
        );

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        task.await.unwrap();

        assert!(shutdown_seen.load(Ordering::Acquire));
    }

    #[tokio::test(start_paused = true)]
    async fn identify_command_drives_the_indicators() {
        let (sensor, _) = TestSensor::new("bme680");
        let transport = MockTransport::new(true);
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancellationToken::new();

        let light_log = Arc::new(Mutex::new(Vec::new()));
        let beeps = Arc::new(AtomicUsize::new(0));
        let indicators = Indicators::new(
            Box::new(RecordingLight(light_log.clone())),
            Box::new(CountingAlert(beeps.clone())),
        );

        let task = tokio::spawn(
            PollScheduler::new(
                registry_with(sensor),
                transport.clone(),
                indicators,
                rx,
                Duration::from_secs(60),
                cancel.clone(),
            )
            .run(),
        );

        tx.send(Command {
            action: "identify".into(),
            params: serde_json::Value::Null,
        })
        .await
        .unwrap();
        tx.send(Command {
            action: "selfdestruct".into(),
            params: serde_json::Value::Null,
        })
        .await
        .unwrap();

        tokio::time::sleep(Duration::from_secs(2)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(beeps.load(Ordering::Acquire), 1);
        assert!(light_log.lock().unwrap().contains(&"info"));
    }
}
