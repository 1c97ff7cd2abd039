/// Orquestador del inventario.
///
/// Un único hilo de trabajo ejecuta los ciclos de uno en uno:
/// escaneo → parseo → enriquecimiento en paralelo → filtro → orden → publicación.
/// Los snapshots y errores salen por un canal como valores inmutables; quien
/// consume ese canal (ver `deliver`) es el contexto de entrega.
use std::collections::HashMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime};

use crossbeam_channel::{select, Receiver, Sender};

use crate::error::ScanError;
use crate::model::{PortEntry, SocketRecord};
use crate::noise_filter;
use crate::port_scanner::{self, SocketSource};
use crate::process_info::{self, HostIdentity, ProcessInspector, ProcessMetadata};
use crate::project_path;
use crate::settings::Settings;

/// Máximo de consultas de metadatos simultáneas por ciclo
pub const MAX_METADATA_WORKERS: usize = 16;

/// Resultado publicado de un ciclo completo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    /// Entradas únicas por puerto, ordenadas de menor a mayor
    pub entries: Vec<PortEntry>,
    pub taken_at: SystemTime,
}

impl Snapshot {
    pub fn new(entries: Vec<PortEntry>) -> Self {
        Self {
            entries,
            taken_at: SystemTime::now(),
        }
    }

    /// Antigüedad del snapshot, para la indicación de datos desactualizados.
    pub fn age(&self) -> Duration {
        self.taken_at.elapsed().unwrap_or_default()
    }
}

/// Eventos que el poller entrega al suscriptor.
#[derive(Debug)]
pub enum PollerEvent {
    Snapshot(Snapshot),
    /// El escaneo falló; el snapshot anterior sigue siendo el vigente
    Failed(ScanError),
}

/// Órdenes hacia el hilo del poller.
#[derive(Debug)]
enum PollerCommand {
    Refresh,
    Shutdown,
}

/// Motivo por el que despierta el bucle del poller.
enum Wake {
    Command(Option<PollerCommand>),
    Settings(Option<Settings>),
    Timer,
}

/// Estado del poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PollerState {
    Idle,
    Scanning,
}

/// Receptor de los eventos publicados.
pub trait Subscriber {
    fn on_snapshot(&mut self, snapshot: Snapshot);
    fn on_error(&mut self, error: ScanError);
}

/// Entrega los eventos al suscriptor en el hilo que llama.
///
/// Bloquea hasta que el poller se detiene y el canal se cierra.
pub fn deliver<S: Subscriber + ?Sized>(events: &Receiver<PollerEvent>, subscriber: &mut S) {
    for event in events.iter() {
        match event {
            PollerEvent::Snapshot(snapshot) => subscriber.on_snapshot(snapshot),
            PollerEvent::Failed(error) => subscriber.on_error(error),
        }
    }
}

/// Último estado conocido del inventario, tal como lo muestra la
/// presentación.
///
/// Un fallo no borra el snapshot vigente: sólo lo marca como desactualizado
/// hasta el siguiente ciclo correcto.
#[derive(Debug, Default)]
pub struct InventoryView {
    snapshot: Option<Snapshot>,
    last_error: Option<String>,
}

impl InventoryView {
    /// Último snapshot correcto, si ya hubo alguno.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn entries(&self) -> &[PortEntry] {
        self.snapshot.as_ref().map(|s| s.entries.as_slice()).unwrap_or(&[])
    }

    /// Mensaje del último ciclo fallido, mientras no llegue uno correcto.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn is_stale(&self) -> bool {
        self.last_error.is_some()
    }
}

impl Subscriber for InventoryView {
    fn on_snapshot(&mut self, snapshot: Snapshot) {
        self.snapshot = Some(snapshot);
        self.last_error = None;
    }

    fn on_error(&mut self, error: ScanError) {
        self.last_error = Some(error.to_string());
    }
}

/// Temporizador de ciclos automáticos.
#[derive(Debug)]
struct Timer {
    interval: Duration,
    deadline: Instant,
}

impl Timer {
    /// Primer disparo inmediato.
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: Instant::now(),
        }
    }

    /// Tiempo restante hasta el próximo disparo.
    fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }

    /// Programa el siguiente disparo tras uno automático.
    fn schedule_next(&mut self) {
        self.deadline = Instant::now() + self.interval;
    }

    /// Desarma y vuelve a armar con un intervalo nuevo.
    fn rearm(&mut self, interval: Duration) {
        self.interval = interval;
        self.deadline = Instant::now() + interval;
    }
}

/// Disparador de refrescos clonable para la capa de presentación.
#[derive(Debug, Clone)]
pub struct PollerRemote {
    commands: Sender<PollerCommand>,
}

impl PollerRemote {
    /// Pide un ciclo fuera de plazo. Si hay uno en curso, se fusiona con él.
    pub fn refresh(&self) {
        if self.commands.send(PollerCommand::Refresh).is_err() {
            log::debug!("Refresco ignorado: el poller ya se detuvo");
        }
    }
}

/// Control del hilo del poller.
#[derive(Debug)]
pub struct PollerHandle {
    remote: PollerRemote,
    thread: Option<thread::JoinHandle<()>>,
}

impl PollerHandle {
    pub fn refresh(&self) {
        self.remote.refresh();
    }

    pub fn remote(&self) -> PollerRemote {
        self.remote.clone()
    }

    /// Detiene el poller y espera a que termine el ciclo en curso.
    pub fn shutdown(mut self) {
        self.stop();
    }

    fn stop(&mut self) {
        let _ = self.remote.commands.send(PollerCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("El hilo del poller terminó con pánico");
            }
        }
    }
}

impl Drop for PollerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Pipeline de inventario con su configuración vigente.
pub struct Poller<S: SocketSource> {
    source: S,
    inspector: Arc<dyn ProcessInspector>,
    identity: HostIdentity,
    settings: Settings,
    state: PollerState,
}

impl<S: SocketSource + 'static> Poller<S> {
    pub fn new(
        source: S,
        inspector: Arc<dyn ProcessInspector>,
        identity: HostIdentity,
        settings: Settings,
    ) -> Self {
        Self {
            source,
            inspector,
            identity,
            settings,
            state: PollerState::Idle,
        }
    }

    /// Lanza el hilo del poller.
    ///
    /// # Arguments
    /// * `settings_changes` - Canal de `SettingsStore::subscribe`; cada valor
    ///   recibido rearma el temporizador y dispara un ciclo inmediato
    ///
    /// # Returns
    /// El control del hilo y el canal de eventos a entregar al suscriptor.
    pub fn spawn(self, settings_changes: Receiver<Settings>) -> (PollerHandle, Receiver<PollerEvent>) {
        let (command_tx, command_rx) = crossbeam_channel::unbounded();
        let (event_tx, event_rx) = crossbeam_channel::unbounded();

        let thread = thread::Builder::new()
            .name("porticide-poller".into())
            .spawn(move || self.run(command_rx, settings_changes, event_tx));

        let thread = match thread {
            Ok(thread) => Some(thread),
            Err(e) => {
                log::error!("No se pudo crear el hilo del poller: {}", e);
                None
            }
        };

        let handle = PollerHandle {
            remote: PollerRemote { commands: command_tx },
            thread,
        };
        (handle, event_rx)
    }

    /// Bucle principal: espera al temporizador, a un refresco o a un cambio de
    /// configuración, y ejecuta como mucho un ciclo a la vez.
    fn run(
        mut self,
        commands: Receiver<PollerCommand>,
        mut settings_changes: Receiver<Settings>,
        events: Sender<PollerEvent>,
    ) {
        log::info!(
            "Poller iniciado: puertos {}-{}, cada {:?}",
            self.settings.port_start,
            self.settings.port_end,
            self.settings.refresh_interval()
        );
        let mut timer = Timer::new(self.settings.refresh_interval());

        loop {
            let wake = select! {
                recv(commands) -> command => Wake::Command(command.ok()),
                recv(settings_changes) -> change => Wake::Settings(change.ok()),
                default(timer.remaining()) => Wake::Timer,
            };

            match wake {
                Wake::Command(Some(PollerCommand::Refresh)) => {}
                Wake::Command(Some(PollerCommand::Shutdown)) | Wake::Command(None) => break,
                Wake::Settings(Some(settings)) => {
                    self.settings = settings;
                    timer.rearm(self.settings.refresh_interval());
                    log::info!(
                        "Temporizador rearmado: puertos {}-{}, cada {:?}",
                        self.settings.port_start,
                        self.settings.port_end,
                        timer.interval
                    );
                }
                Wake::Settings(None) => {
                    // La configuración ya no cambiará
                    settings_changes = crossbeam_channel::never();
                    continue;
                }
                Wake::Timer => timer.schedule_next(),
            }

            if !self.publish_cycle(&events) {
                break;
            }
            if self.coalesce_pending(&commands) {
                break;
            }
        }

        log::info!("Poller detenido");
    }

    /// Ejecuta un ciclo y publica su resultado.
    ///
    /// # Returns
    /// `false` si ya no queda nadie escuchando los eventos.
    fn publish_cycle(&mut self, events: &Sender<PollerEvent>) -> bool {
        let event = match self.run_cycle() {
            Ok(snapshot) => PollerEvent::Snapshot(snapshot),
            Err(e) => {
                log::error!("Fallo en el escaneo de puertos: {}", e);
                PollerEvent::Failed(e)
            }
        };
        events.send(event).is_ok()
    }

    /// Descarta los refrescos que llegaron durante el ciclo: ya quedan
    /// cubiertos por el snapshot recién publicado.
    ///
    /// # Returns
    /// `true` si entre ellos había una orden de parada.
    fn coalesce_pending(&self, commands: &Receiver<PollerCommand>) -> bool {
        let mut merged = 0;
        for command in commands.try_iter() {
            match command {
                PollerCommand::Refresh => merged += 1,
                PollerCommand::Shutdown => return true,
            }
        }
        if merged > 0 {
            log::debug!("{} refrescos fusionados con el ciclo anterior", merged);
        }
        false
    }

    /// Ejecuta un ciclo completo con una copia consistente de la configuración.
    pub fn run_cycle(&mut self) -> Result<Snapshot, ScanError> {
        self.state = PollerState::Scanning;
        let result = self.scan_and_build();
        self.state = PollerState::Idle;
        result
    }

    fn scan_and_build(&self) -> Result<Snapshot, ScanError> {
        let started = Instant::now();
        let settings = self.settings.clone();

        let raw = self.source.scan()?;
        let records = port_scanner::parse_lsof_output(&raw, settings.port_range());
        let parsed = records.len();

        let entries = enrich_records(&records, self.inspector.as_ref(), &self.identity, MAX_METADATA_WORKERS);
        let mut entries = noise_filter::filter_entries(entries, &settings, &self.identity);
        // Ordenar sólo después de deduplicar: "la primera gana" usa el orden del escaneo
        entries.sort_by_key(|entry| entry.port);

        log::debug!(
            "Ciclo completado ({:?}): {} sockets, {} puertos publicados",
            started.elapsed(),
            parsed,
            entries.len()
        );
        Ok(Snapshot::new(entries))
    }

    pub fn is_scanning(&self) -> bool {
        self.state == PollerState::Scanning
    }
}

/// Enriquece los registros consultando los metadatos de cada PID distinto
/// en un pool acotado de hilos.
///
/// El resultado conserva exactamente el orden de `records`.
pub fn enrich_records(
    records: &[SocketRecord],
    inspector: &dyn ProcessInspector,
    identity: &HostIdentity,
    max_workers: usize,
) -> Vec<PortEntry> {
    // PIDs únicos en orden de aparición
    let mut pids: Vec<u32> = Vec::new();
    for record in records {
        if !pids.contains(&record.pid) {
            pids.push(record.pid);
        }
    }

    let metadata = fetch_all(&pids, inspector, max_workers);

    records
        .iter()
        .map(|record| {
            let mut entry = PortEntry::from_record(record);
            if let Some(meta) = metadata.get(&record.pid) {
                entry.command_line = meta.command_line.clone();
                entry.path = meta.path.clone();
                entry.project_path =
                    project_path::display_project_path(meta.cwd.as_deref(), &identity.home);
            }
            entry
        })
        .collect()
}

/// Consulta los metadatos de cada PID con a lo sumo `max_workers` hilos.
fn fetch_all(
    pids: &[u32],
    inspector: &dyn ProcessInspector,
    max_workers: usize,
) -> HashMap<u32, ProcessMetadata> {
    if pids.is_empty() {
        return HashMap::new();
    }

    let workers = max_workers.clamp(1, pids.len());
    let (job_tx, job_rx) = crossbeam_channel::unbounded::<u32>();
    let (result_tx, result_rx) = crossbeam_channel::unbounded();

    for &pid in pids {
        let _ = job_tx.send(pid);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let result_tx = result_tx.clone();
            scope.spawn(move || {
                for pid in job_rx.iter() {
                    let metadata = process_info::fetch_metadata(inspector, pid);
                    if result_tx.send((pid, metadata)).is_err() {
                        break;
                    }
                }
            });
        }
    });
    drop(result_tx);

    result_rx.try_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const HEADER: &str = "COMMAND   PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME";

    /// Fuente fija de texto de lsof, reemplazable durante la prueba.
    #[derive(Clone)]
    struct FakeSource {
        output: Arc<Mutex<Result<String, String>>>,
        scans: Arc<AtomicUsize>,
    }

    impl FakeSource {
        fn new(rows: &[&str]) -> Self {
            let mut text = String::from(HEADER);
            for row in rows {
                text.push('\n');
                text.push_str(row);
            }
            Self {
                output: Arc::new(Mutex::new(Ok(text))),
                scans: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn fail_with(&self, message: &str) {
            *self.output.lock().unwrap() = Err(message.to_string());
        }
    }

    impl SocketSource for FakeSource {
        fn scan(&self) -> Result<String, ScanError> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            self.output
                .lock()
                .unwrap()
                .clone()
                .map_err(|status| ScanError::AbnormalExit {
                    program: "lsof".into(),
                    status,
                })
        }
    }

    /// Fuente que avisa al empezar cada escaneo y espera permiso para
    /// terminarlo.
    struct GatedSource {
        inner: FakeSource,
        entered: Sender<()>,
        release: Receiver<()>,
    }

    impl SocketSource for GatedSource {
        fn scan(&self) -> Result<String, ScanError> {
            let _ = self.entered.send(());
            let _ = self.release.recv_timeout(Duration::from_secs(5));
            self.inner.scan()
        }
    }

    /// Inspector con metadatos completos para cualquier PID.
    struct FakeInspector {
        home: String,
        calls: AtomicUsize,
    }

    impl FakeInspector {
        fn new(home: &str) -> Self {
            Self {
                home: home.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl ProcessInspector for FakeInspector {
        fn command_line(&self, pid: u32) -> Option<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Some(format!("node server-{}.js", pid))
        }
        fn working_directory(&self, pid: u32) -> Option<String> {
            Some(format!("{}/code/app-{}", self.home, pid))
        }
        fn executable_path(&self, _pid: u32) -> Option<String> {
            Some(format!("{}/.volta/bin/node", self.home))
        }
    }

    fn identity() -> HostIdentity {
        HostIdentity::new("me", "/nonexistent-home/me")
    }

    fn poller(source: FakeSource, settings: Settings) -> Poller<FakeSource> {
        Poller::new(
            source,
            Arc::new(FakeInspector::new("/nonexistent-home/me")),
            identity(),
            settings,
        )
    }

    /// Verifica un ciclo completo: M puertos distintos, orden ascendente y
    /// todos los campos enriquecidos
    #[test]
    fn test_full_cycle_publishes_sorted_unique_ports() {
        let source = FakeSource::new(&[
            "node  8123 me 23u IPv4 0x0 0t0 TCP *:8080 (LISTEN)",
            "node  8123 me 24u IPv6 0x0 0t0 TCP *:8080 (LISTEN)",
            "vite  4000 me 20u IPv4 0x0 0t0 TCP 127.0.0.1:5173 (LISTEN)",
            "bun   4100 me 20u IPv4 0x0 0t0 TCP *:3000 (LISTEN)",
            "mdns  4200 me 20u IPv4 0x0 0t0 UDP *:5353",
        ]);
        let mut poller = poller(source, Settings::default());

        let snapshot = poller.run_cycle().unwrap();
        let ports: Vec<u16> = snapshot.entries.iter().map(|e| e.port).collect();
        assert_eq!(ports, vec![3000, 5173, 5353, 8080]);
        assert!(!poller.is_scanning());

        for entry in &snapshot.entries {
            assert!(entry.command_line.is_some());
            assert!(entry.path.is_some());
            assert_eq!(
                entry.project_path.as_deref(),
                Some(format!("~/code/app-{}", entry.pid).as_str())
            );
        }
    }

    /// Verifica que la deduplicación usa el orden del escaneo, no el final
    #[test]
    fn test_dedup_uses_scan_order() {
        let source = FakeSource::new(&[
            "b 20 me 1u IPv4 0x0 0t0 TCP *:4000 (LISTEN)",
            "a 10 me 1u IPv4 0x0 0t0 TCP *:4000 (LISTEN)",
        ]);
        let snapshot = poller(source, Settings::default()).run_cycle().unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].pid, 20);
    }

    /// Verifica que los metadatos se consultan una vez por PID
    #[test]
    fn test_metadata_fetched_once_per_pid() {
        let records: Vec<SocketRecord> = [3000u16, 3001, 3002]
            .iter()
            .map(|&port| SocketRecord {
                port,
                pid: 77,
                command: "node".into(),
                user: Some("me".into()),
                protocol: crate::model::Protocol::Tcp,
            })
            .collect();
        let inspector = FakeInspector::new("/h");
        let entries = enrich_records(&records, &inspector, &identity(), 4);
        assert_eq!(entries.len(), 3);
        assert_eq!(inspector.calls.load(Ordering::SeqCst), 1);
    }

    /// Verifica que el enriquecimiento en paralelo conserva el orden de entrada
    #[test]
    fn test_enrichment_preserves_order() {
        let records: Vec<SocketRecord> = (0..40u32)
            .map(|i| SocketRecord {
                port: 9000 - i as u16,
                pid: 1000 + i,
                command: "node".into(),
                user: None,
                protocol: crate::model::Protocol::Tcp,
            })
            .collect();
        let entries = enrich_records(&records, &FakeInspector::new("/h"), &identity(), 3);
        let pids: Vec<u32> = entries.iter().map(|e| e.pid).collect();
        let expected: Vec<u32> = records.iter().map(|r| r.pid).collect();
        assert_eq!(pids, expected);
    }

    /// Verifica que un PID desaparecido deja la entrada con datos parciales
    #[test]
    fn test_vanished_process_keeps_entry() {
        struct Gone;
        impl ProcessInspector for Gone {
            fn command_line(&self, _pid: u32) -> Option<String> {
                None
            }
            fn working_directory(&self, _pid: u32) -> Option<String> {
                None
            }
            fn executable_path(&self, _pid: u32) -> Option<String> {
                None
            }
        }

        let source = FakeSource::new(&["node 5 me 1u IPv4 0x0 0t0 TCP *:3000 (LISTEN)"]);
        let mut poller = Poller::new(source, Arc::new(Gone), identity(), Settings::default());
        let snapshot = poller.run_cycle().unwrap();
        assert_eq!(snapshot.entries.len(), 1);
        assert_eq!(snapshot.entries[0].command_line, None);
        assert_eq!(snapshot.entries[0].service().display_name, "Unknown");
    }

    /// Verifica el primer snapshot, el error posterior y la parada por el hilo
    #[test]
    fn test_spawned_poller_publishes_snapshot_then_error() {
        let source = FakeSource::new(&["node 8123 me 23u IPv4 0x0 0t0 TCP *:3000 (LISTEN)"]);
        let settings = Settings {
            refresh_interval_secs: 3600.0,
            ..Settings::default()
        };
        let (_settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (handle, events) = poller(source.clone(), settings).spawn(settings_rx);

        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollerEvent::Snapshot(snapshot) => assert_eq!(snapshot.entries.len(), 1),
            PollerEvent::Failed(e) => panic!("error inesperado: {}", e),
        }

        source.fail_with("signal: 9");
        handle.refresh();
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollerEvent::Failed(ScanError::AbnormalExit { status, .. }) => assert_eq!(status, "signal: 9"),
            other => panic!("se esperaba un error, llegó {:?}", other),
        }

        handle.shutdown();
        assert!(events.recv_timeout(Duration::from_secs(5)).is_err());
    }

    /// Verifica que un cambio de configuración rearma y refresca con el rango nuevo
    #[test]
    fn test_settings_change_triggers_cycle_with_new_range() {
        let source = FakeSource::new(&[
            "node 1 me 1u IPv4 0x0 0t0 TCP *:3000 (LISTEN)",
            "node 2 me 1u IPv4 0x0 0t0 TCP *:8000 (LISTEN)",
        ]);
        let settings = Settings {
            refresh_interval_secs: 3600.0,
            ..Settings::default()
        };
        let (settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (handle, events) = poller(source, settings.clone()).spawn(settings_rx);

        let first = events.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(first, PollerEvent::Snapshot(ref s) if s.entries.len() == 2));

        settings_tx
            .send(Settings {
                port_start: 7000,
                ..settings
            })
            .unwrap();
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollerEvent::Snapshot(snapshot) => {
                let ports: Vec<u16> = snapshot.entries.iter().map(|e| e.port).collect();
                assert_eq!(ports, vec![8000]);
            }
            PollerEvent::Failed(e) => panic!("error inesperado: {}", e),
        }
        handle.shutdown();
    }

    /// Verifica que el temporizador dispara ciclos sin intervención
    #[test]
    fn test_timer_fires_repeatedly() {
        let source = FakeSource::new(&["node 1 me 1u IPv4 0x0 0t0 TCP *:3000 (LISTEN)"]);
        let settings = Settings {
            refresh_interval_secs: 0.05,
            ..Settings::default()
        };
        let (_settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (handle, events) = poller(source.clone(), settings).spawn(settings_rx);

        for _ in 0..3 {
            assert!(matches!(
                events.recv_timeout(Duration::from_secs(5)).unwrap(),
                PollerEvent::Snapshot(_)
            ));
        }
        handle.shutdown();
        assert!(source.scans.load(Ordering::SeqCst) >= 3);
    }

    /// Verifica que varios refrescos pedidos durante un ciclo se fusionan
    /// con él en lugar de encolar ciclos extra
    #[test]
    fn test_refreshes_during_cycle_are_merged() {
        let inner = FakeSource::new(&["node 1 me 1u IPv4 0x0 0t0 TCP *:3000 (LISTEN)"]);
        let (entered_tx, entered_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        let source = GatedSource {
            inner: inner.clone(),
            entered: entered_tx,
            release: release_rx,
        };
        let settings = Settings {
            refresh_interval_secs: 3600.0,
            ..Settings::default()
        };
        let (_settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let poller = Poller::new(
            source,
            Arc::new(FakeInspector::new("/nonexistent-home/me")),
            identity(),
            settings,
        );
        let (handle, events) = poller.spawn(settings_rx);

        // Primer ciclo en curso: llegan tres refrescos antes de que termine
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        for _ in 0..3 {
            handle.refresh();
        }
        release_tx.send(()).unwrap();
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            PollerEvent::Snapshot(_)
        ));

        // Ningún ciclo adicional por los refrescos fusionados
        assert!(entered_rx.recv_timeout(Duration::from_millis(300)).is_err());
        assert!(events.try_recv().is_err());
        assert_eq!(inner.scans.load(Ordering::SeqCst), 1);

        // Un refresco posterior sí produce exactamente un ciclo más
        release_tx.send(()).unwrap();
        handle.refresh();
        assert!(matches!(
            events.recv_timeout(Duration::from_secs(5)).unwrap(),
            PollerEvent::Snapshot(_)
        ));
        assert_eq!(inner.scans.load(Ordering::SeqCst), 2);

        handle.shutdown();
    }

    /// Verifica que un fallo conserva el último snapshot y sólo lo marca
    /// como desactualizado
    #[test]
    fn test_failure_keeps_last_snapshot() {
        let source = FakeSource::new(&["node 8123 me 23u IPv4 0x0 0t0 TCP *:3000 (LISTEN)"]);
        let settings = Settings {
            refresh_interval_secs: 3600.0,
            ..Settings::default()
        };
        let (_settings_tx, settings_rx) = crossbeam_channel::unbounded();
        let (handle, events) = poller(source.clone(), settings).spawn(settings_rx);

        let mut view = InventoryView::default();
        assert!(view.snapshot().is_none());

        let published = match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollerEvent::Snapshot(snapshot) => snapshot,
            PollerEvent::Failed(e) => panic!("error inesperado: {}", e),
        };
        view.on_snapshot(published.clone());

        source.fail_with("exit status: 2");
        handle.refresh();
        match events.recv_timeout(Duration::from_secs(5)).unwrap() {
            PollerEvent::Failed(error) => view.on_error(error),
            other => panic!("se esperaba un error, llegó {:?}", other),
        }

        assert_eq!(view.snapshot(), Some(&published));
        assert_eq!(view.entries().len(), 1);
        assert!(view.is_stale());
        assert!(view.last_error().unwrap().contains("exit status: 2"));

        // El siguiente ciclo correcto limpia la marca
        view.on_snapshot(Snapshot::new(Vec::new()));
        assert!(!view.is_stale());
        assert!(view.entries().is_empty());

        handle.shutdown();
    }

    /// Verifica que deliver reparte snapshots y errores al suscriptor
    #[test]
    fn test_deliver_dispatches_events() {
        #[derive(Default)]
        struct Recorder {
            snapshots: usize,
            errors: usize,
        }
        impl Subscriber for Recorder {
            fn on_snapshot(&mut self, _snapshot: Snapshot) {
                self.snapshots += 1;
            }
            fn on_error(&mut self, _error: ScanError) {
                self.errors += 1;
            }
        }

        let (tx, rx) = crossbeam_channel::unbounded();
        tx.send(PollerEvent::Snapshot(Snapshot::new(Vec::new()))).unwrap();
        tx.send(PollerEvent::Failed(ScanError::AbnormalExit {
            program: "lsof".into(),
            status: "exit status: 2".into(),
        }))
        .unwrap();
        drop(tx);

        let mut recorder = Recorder::default();
        deliver(&rx, &mut recorder);
        assert_eq!((recorder.snapshots, recorder.errors), (1, 1));
    }

    /// Verifica que un timer rearmado espera el intervalo nuevo completo
    #[test]
    fn test_timer_rearm() {
        let mut timer = Timer::new(Duration::from_secs(3600));
        assert_eq!(timer.remaining(), Duration::ZERO);
        timer.rearm(Duration::from_secs(60));
        assert!(timer.remaining() > Duration::from_secs(59));
        assert_eq!(timer.interval, Duration::from_secs(60));
    }
}
