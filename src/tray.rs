/// Módulo del system tray (bandeja del sistema).
///
/// Capa de presentación mínima: muestra el último snapshot publicado por el
/// poller y reenvía las intenciones del usuario (refrescar, terminar
/// procesos, cambiar la configuración). No contiene lógica de inventario.
///
/// ## Características del menú:
/// - Lista de servicios con puerto, PID y proyecto
/// - Terminar (SIGTERM) o forzar (SIGKILL) por entrada, o todos a la vez
/// - Indicación de datos desactualizados si el último escaneo falló
/// - Interruptores de procesos del sistema y vista detallada
use ksni::{self, menu::CheckmarkItem, menu::StandardItem, menu::SubMenu, Tray};
use std::process;

use crossbeam_channel::Receiver;
use porticide::{
    deliver, process_info, InventoryView, PollerEvent, PollerHandle, PollerRemote, PortEntry,
    ScanError, Settings, SettingsStore, Snapshot, Subscriber,
};

// ─────────────────────────────────────────────────────────────
// Estado del tray
// ─────────────────────────────────────────────────────────────

/// Estado del tray: vista del inventario y acceso a la configuración y al
/// poller para reenviar acciones.
#[derive(Debug)]
pub struct PorticideTray {
    /// Último snapshot correcto y, si el último ciclo falló, su error
    view: InventoryView,
    settings: SettingsStore,
    poller: PollerRemote,
}

impl PorticideTray {
    pub fn new(settings: SettingsStore, poller: PollerRemote) -> Self {
        Self {
            view: InventoryView::default(),
            settings,
            poller,
        }
    }

    fn apply_snapshot(&mut self, snapshot: Snapshot) {
        log::debug!("Snapshot recibido: {} puertos", snapshot.entries.len());
        self.view.on_snapshot(snapshot);
    }

    fn apply_error(&mut self, error: ScanError) {
        self.view.on_error(error);
    }

    fn entries(&self) -> &[PortEntry] {
        self.view.entries()
    }

    /// Modifica la configuración; el poller rearma y refresca al recibirla.
    fn change_settings(&mut self, change: impl FnOnce(&mut Settings)) {
        if let Err(e) = self.settings.update(change) {
            log::error!("No se pudo guardar la configuración: {}", e);
        }
    }

    fn terminate_entry(&mut self, pid: u32, port: u16, force: bool) {
        log::info!("Cerrando puerto {} (PID: {}, forzado: {})", port, pid, force);
        if !process_info::terminate(pid, force) {
            log::error!("Error cerrando puerto {}", port);
        }
        self.poller.refresh();
    }
}

// ─────────────────────────────────────────────────────────────
// Implementación del menú contextual del tray
// ─────────────────────────────────────────────────────────────

impl Tray for PorticideTray {
    fn icon_name(&self) -> String {
        "network-server".into()
    }

    fn title(&self) -> String {
        format!("Porticide ({} puertos)", self.entries().len())
    }

    fn id(&self) -> String {
        "porticide".into()
    }

    /// Construye el menú a partir del snapshot vigente.
    ///
    /// ```text
    /// 🔄 Actualizar
    /// 📡 3 puertos · hace 2s
    /// ⚠️ Datos desactualizados: ...      (sólo si el último ciclo falló)
    /// ──────────
    /// vite-dev-server :5173 ▸ submenu
    /// ...
    /// ──────────
    /// ⚔️ Terminar todos (3)
    /// ☐ Mostrar procesos del sistema
    /// ☐ Vista detallada
    /// ──────────
    /// ❌ Salir
    /// ```
    fn menu(&self) -> Vec<ksni::MenuItem<Self>> {
        let settings = self.settings.current();
        let entries = self.entries();

        let mut items: Vec<ksni::MenuItem<Self>> = vec![
            build_refresh_item(),
            build_status_item(self.view.snapshot()),
        ];
        if let Some(error) = self.view.last_error() {
            items.push(build_stale_item(error));
        }
        items.push(ksni::MenuItem::Separator);

        if entries.is_empty() && self.view.snapshot().is_some() {
            items.push(build_empty_message(&settings));
        }
        for entry in entries {
            items.push(build_entry_item(entry, &settings));
        }

        items.push(ksni::MenuItem::Separator);
        if !entries.is_empty() {
            items.push(build_kill_all_item(entries.len()));
        }
        items.push(build_system_toggle(settings.show_system_processes));
        items.push(build_detailed_toggle(settings.show_detailed));
        items.push(ksni::MenuItem::Separator);
        items.push(build_exit_item());

        items
    }
}

// ─────────────────────────────────────────────────────────────
// Constructores de items del menú
// ─────────────────────────────────────────────────────────────

fn build_refresh_item() -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label: "🔄 Actualizar".into(),
        activate: Box::new(|tray: &mut PorticideTray| {
            log::info!("Actualizando lista de puertos...");
            tray.poller.refresh();
        }),
        ..Default::default()
    }
    .into()
}

/// Encabezado con el conteo y la antigüedad del snapshot.
fn build_status_item(snapshot: Option<&Snapshot>) -> ksni::MenuItem<PorticideTray> {
    let label = match snapshot {
        Some(snapshot) => format!(
            "📡 {} puertos · hace {}s",
            snapshot.entries.len(),
            snapshot.age().as_secs()
        ),
        None => "⏳ Escaneando...".into(),
    };
    StandardItem {
        label,
        enabled: false,
        ..Default::default()
    }
    .into()
}

fn build_stale_item(error: &str) -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label: format!("⚠️ Datos desactualizados: {}", error),
        enabled: false,
        ..Default::default()
    }
    .into()
}

fn build_empty_message(settings: &Settings) -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label: format!(
            "✅ Nada escuchando en {}-{}",
            settings.port_start, settings.port_end
        ),
        enabled: false,
        ..Default::default()
    }
    .into()
}

/// Item de una entrada.
///
/// Con `confirm_before_kill` la entrada es un submenú y terminar requiere un
/// segundo clic; sin él, un clic envía SIGTERM directamente.
fn build_entry_item(entry: &PortEntry, settings: &Settings) -> ksni::MenuItem<PorticideTray> {
    let service = entry.service();
    let mut label = format!("{} :{}", service.display_name, entry.port);
    if settings.show_detailed {
        if let Some(detail) = &service.detail {
            label.push_str(&format!(" ({})", detail));
        }
        if let Some(project) = &entry.project_path {
            label.push_str(&format!(" · {}", project));
        }
    }

    let pid = entry.pid;
    let port = entry.port;
    let icon_name = service.icon.icon_name().to_string();

    if !settings.confirm_before_kill {
        return StandardItem {
            label,
            icon_name,
            activate: Box::new(move |tray: &mut PorticideTray| {
                tray.terminate_entry(pid, port, false);
            }),
            ..Default::default()
        }
        .into();
    }

    let mut submenu: Vec<ksni::MenuItem<PorticideTray>> = vec![info_item(format!(
        "{} · PID {}",
        entry.protocol.label(),
        pid
    ))];
    if let Some(project) = &entry.project_path {
        submenu.push(info_item(format!("📁 {}", project)));
    }
    if let Some(command_line) = &entry.command_line {
        submenu.push(info_item(format!("💻 {}", command_line)));
    }
    submenu.push(ksni::MenuItem::Separator);
    submenu.push(
        StandardItem {
            label: "🔴 Terminar (SIGTERM)".into(),
            activate: Box::new(move |tray: &mut PorticideTray| {
                tray.terminate_entry(pid, port, false);
            }),
            ..Default::default()
        }
        .into(),
    );
    submenu.push(
        StandardItem {
            label: "💀 Forzar cierre (SIGKILL)".into(),
            activate: Box::new(move |tray: &mut PorticideTray| {
                tray.terminate_entry(pid, port, true);
            }),
            ..Default::default()
        }
        .into(),
    );

    SubMenu {
        label,
        icon_name,
        submenu,
        ..Default::default()
    }
    .into()
}

fn info_item(label: String) -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label,
        enabled: false,
        ..Default::default()
    }
    .into()
}

fn build_kill_all_item(total: usize) -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label: format!("⚔️ Terminar todos ({})", total),
        activate: Box::new(|tray: &mut PorticideTray| {
            let pids: Vec<u32> = tray.entries().iter().map(|e| e.pid).collect();
            let count = process_info::terminate_all(pids, false);
            log::info!("{} procesos terminados", count);
            tray.poller.refresh();
        }),
        ..Default::default()
    }
    .into()
}

fn build_system_toggle(checked: bool) -> ksni::MenuItem<PorticideTray> {
    CheckmarkItem {
        label: "Mostrar procesos del sistema".into(),
        checked,
        activate: Box::new(|tray: &mut PorticideTray| {
            tray.change_settings(|s| s.show_system_processes = !s.show_system_processes);
        }),
        ..Default::default()
    }
    .into()
}

fn build_detailed_toggle(checked: bool) -> ksni::MenuItem<PorticideTray> {
    CheckmarkItem {
        label: "Vista detallada".into(),
        checked,
        activate: Box::new(|tray: &mut PorticideTray| {
            tray.change_settings(|s| s.show_detailed = !s.show_detailed);
        }),
        ..Default::default()
    }
    .into()
}

fn build_exit_item() -> ksni::MenuItem<PorticideTray> {
    StandardItem {
        label: "❌ Salir".into(),
        activate: Box::new(|_: &mut PorticideTray| {
            log::info!("Porticide cerrándose...");
            process::exit(0);
        }),
        ..Default::default()
    }
    .into()
}

// ─────────────────────────────────────────────────────────────
// Entrega de eventos del poller al tray
// ─────────────────────────────────────────────────────────────

/// Suscriptor que aplica cada evento sobre el modelo del tray.
struct TrayBridge {
    handle: ksni::Handle<PorticideTray>,
}

impl Subscriber for TrayBridge {
    fn on_snapshot(&mut self, snapshot: Snapshot) {
        self.handle.update(move |tray: &mut PorticideTray| tray.apply_snapshot(snapshot));
    }

    fn on_error(&mut self, error: ScanError) {
        self.handle.update(move |tray: &mut PorticideTray| tray.apply_error(error));
    }
}

/// Inicia el system tray y ejecuta el loop principal.
///
/// Un hilo aparte entrega los eventos del poller al modelo del tray.
pub fn run_tray(settings: SettingsStore, poller: PollerHandle, events: Receiver<PollerEvent>) {
    log::info!("Iniciando Porticide system tray...");

    let tray = PorticideTray::new(settings, poller.remote());
    let service = ksni::TrayService::new(tray);
    let handle = service.handle();

    std::thread::spawn(move || {
        let mut bridge = TrayBridge { handle };
        deliver(&events, &mut bridge);
    });

    // Ejecutar el servicio (bloquea el hilo principal)
    if let Err(e) = service.run() {
        log::error!("Error ejecutando el servicio de tray: {}", e);
    }
    poller.shutdown();
}
