/// Filtro de ruido y deduplicación por puerto.
///
/// Descarta procesos del sistema, de otros usuarios y de rutas reservadas
/// (salvo que la configuración pida verlos) y conserva la primera entrada de
/// cada puerto en el orden de entrada.
use std::collections::HashSet;

use crate::model::PortEntry;
use crate::process_info::HostIdentity;
use crate::project_path;
use crate::settings::Settings;

/// Fragmentos de nombre de servicios del SO o en segundo plano
const SYSTEM_PROCESS_NAMES: &[&str] = &[
    "OrbStack",
    "com.apple",
    "launchd",
    "mDNSResponder",
    "airportd",
    "rapportd",
    "sharingd",
    "WiFiAgent",
    "ControlCenter",
    "Finder",
    "SystemUIServer",
    "loginwindow",
    "WindowServer",
    "coreduetd",
    "trustd",
    "cloudd",
    "apsd",
    "cfprefsd",
    "kernel_task",
    "systemd",
    "avahi-daemon",
    "cupsd",
];

/// Prefijos de ruta reservados para el SO
const SYSTEM_PATH_PREFIXES: &[&str] = &[
    "/System/",
    "/usr/",
    "/bin/",
    "/sbin/",
    "/private/",
    "/Library/Apple/",
    "/Applications/Utilities/",
];

/// Frameworks embebidos en paquetes `.app`
const APP_BUNDLE_FRAMEWORKS: &str = ".app/Contents/Frameworks/";

/// Aplica las reglas de exclusión y deduplica por puerto.
///
/// # Arguments
/// * `entries` - Entradas enriquecidas, en el orden del escaneo
/// * `settings` - Copia de la configuración del ciclo
/// * `identity` - Usuario y home actuales
///
/// # Returns
/// Entradas supervivientes, una por puerto, sin reordenar.
pub fn filter_entries(
    entries: Vec<PortEntry>,
    settings: &Settings,
    identity: &HostIdentity,
) -> Vec<PortEntry> {
    let home = identity.home_str();
    let mut seen_ports = HashSet::new();

    entries
        .into_iter()
        .filter(|entry| settings.show_system_processes || !is_noise(entry, &identity.user, &home))
        .filter(|entry| seen_ports.insert(entry.port))
        .collect()
}

/// `true` si alguna regla de exclusión descarta la entrada.
fn is_noise(entry: &PortEntry, current_user: &str, home: &str) -> bool {
    if entry.user.as_deref().is_some_and(|user| user != current_user) {
        return true;
    }
    if is_system_process(entry, home) {
        return true;
    }
    if entry.path.as_deref().is_some_and(is_system_path) {
        return true;
    }
    if let Some(project) = entry.project_path.as_deref() {
        if project_path::is_unusable_project_path(project) || is_system_path(project) {
            return true;
        }
    }
    // Ni es nuestro ni parece un proyecto
    if let Some(path) = entry.path.as_deref() {
        if !is_under_home(path, home) && entry.project_path.is_none() {
            return true;
        }
    }
    false
}

fn is_system_process(entry: &PortEntry, home: &str) -> bool {
    let display_name = entry.service().display_name;
    let denied = |name: &str| SYSTEM_PROCESS_NAMES.iter().any(|fragment| name.contains(fragment));
    if denied(&entry.process_name) || denied(&display_name) {
        return true;
    }

    entry
        .path
        .as_deref()
        .is_some_and(|path| path.contains(APP_BUNDLE_FRAMEWORKS) && !is_under_home(path, home))
}

fn is_system_path(path: &str) -> bool {
    SYSTEM_PATH_PREFIXES.iter().any(|prefix| path.starts_with(prefix))
}

fn is_under_home(path: &str, home: &str) -> bool {
    !home.is_empty() && path.starts_with(home)
}
