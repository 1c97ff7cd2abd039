//! # Porticide 🔪
//!
//! Aplicación de bandeja del sistema que muestra qué servidores de
//! desarrollo están escuchando en la máquina y permite terminarlos.
//!
//! ## Uso
//! - `porticide`: se desvincula de la terminal y muestra el ícono del tray.
//! - `porticide --once`: ejecuta un único escaneo, lo imprime y termina.

mod tray;

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use porticide::{
    settings, HostIdentity, LsofScanner, Poller, Settings, SettingsStore, SystemInspector,
};

/// Argumentos de línea de comandos.
#[derive(Parser, Debug)]
#[command(name = "porticide", version, about = "Inventario en vivo de puertos en escucha")]
struct Cli {
    /// Ruta del archivo de configuración
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Ejecuta un único ciclo, imprime el inventario y termina
    #[arg(long)]
    once: bool,

    /// Incluye procesos del sistema y de otros usuarios (no se guarda)
    #[arg(long)]
    all: bool,
}

/// Desvincula el proceso de la terminal que lo inició.
///
/// Llama a `setsid()` para crear una nueva sesión sin terminal de control,
/// de modo que `porticide &` sobreviva al cierre de la shell.
fn daemonize() {
    // setsid() falla si el proceso ya es líder de sesión; en ese caso ya
    // está desenganchado
    if let Err(err) = nix::unistd::setsid() {
        log::debug!("setsid() no aplicable en este contexto: {err}");
    }
}

/// Ejecuta un ciclo en el hilo actual e imprime una línea por entrada.
fn run_once(settings: Settings, identity: HostIdentity) -> ExitCode {
    let mut poller = Poller::new(
        LsofScanner::default(),
        Arc::new(SystemInspector::default()),
        identity,
        settings,
    );

    match poller.run_cycle() {
        Ok(snapshot) => {
            for entry in &snapshot.entries {
                let service = entry.service();
                let detail = service.detail.map(|d| format!(" [{}]", d)).unwrap_or_default();
                let project = entry.project_path.as_deref().unwrap_or("-");
                println!("{}{}  {}", entry, detail, project);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("Fallo en el escaneo de puertos: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn main() -> ExitCode {
    // Inicializar logging (nivel INFO por defecto, configurable con RUST_LOG)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let cli = Cli::parse();

    let config_path = cli.config.unwrap_or_else(settings::default_settings_path);
    let mut store = SettingsStore::load_or_default(config_path);
    let mut initial = store.current();
    if cli.all {
        initial.show_system_processes = true;
    }
    let identity = HostIdentity::current();

    if cli.once {
        return run_once(initial, identity);
    }

    log::info!("🔪 Porticide v{} iniciando...", env!("CARGO_PKG_VERSION"));
    log::info!("Configuración: {}", store.path().display());

    // Desengancharse de la terminal para sobrevivir al cierre de la sesión
    daemonize();

    let settings_changes = store.subscribe();
    let poller = Poller::new(
        LsofScanner::default(),
        Arc::new(SystemInspector::default()),
        identity,
        initial,
    );
    let (handle, events) = poller.spawn(settings_changes);

    // Lanzar el system tray (bloquea el hilo principal)
    tray::run_tray(store, handle, events);
    ExitCode::SUCCESS
}
