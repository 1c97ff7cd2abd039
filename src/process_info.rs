/// Módulo de inspección de procesos.
///
/// Obtiene, para un PID, la línea de comandos (`ps`), el directorio de
/// trabajo (`lsof -d cwd`) y la ruta del ejecutable (llamada nativa del SO).
/// Cada consulta es independiente: si una falla, las demás siguen aportando
/// datos parciales. También expone el envío de señales para terminar procesos.
use std::path::PathBuf;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::{getuid, Pid, User};

use crate::exec::{self, DEFAULT_TOOL_TIMEOUT};

/// Prefijo de la línea con la ruta en la salida `-F n` de lsof
const CWD_SENTINEL: char = 'n';

/// Consultas de metadatos por PID. Permite sustituir el sistema en pruebas.
pub trait ProcessInspector: Send + Sync {
    /// Línea de comandos completa, recortada. `None` si está vacía o falló.
    fn command_line(&self, pid: u32) -> Option<String>;
    /// Directorio de trabajo actual del proceso.
    fn working_directory(&self, pid: u32) -> Option<String>;
    /// Ruta absoluta del ejecutable. `None` si el proceso ya no existe.
    fn executable_path(&self, pid: u32) -> Option<String>;
}

/// Metadatos obtenidos para un PID en un ciclo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessMetadata {
    pub command_line: Option<String>,
    pub cwd: Option<String>,
    pub path: Option<String>,
}

/// Ejecuta las tres consultas de un PID, tolerando fallos individuales.
pub fn fetch_metadata<I: ProcessInspector + ?Sized>(inspector: &I, pid: u32) -> ProcessMetadata {
    ProcessMetadata {
        command_line: inspector.command_line(pid),
        cwd: inspector.working_directory(pid),
        path: inspector.executable_path(pid),
    }
}

/// Inspector real basado en `ps`, `lsof` y la API del SO.
#[derive(Debug, Clone)]
pub struct SystemInspector {
    timeout: Duration,
}

impl SystemInspector {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Ejecuta una consulta y devuelve stdout, o `None` si la herramienta falló.
    fn query(&self, program: &str, args: &[&str], pid: u32) -> Option<String> {
        match exec::run_tool(program, args, self.timeout) {
            Ok(output) => Some(output.stdout),
            Err(e) => {
                log::debug!("Metadatos no disponibles para PID {}: {}", pid, e);
                None
            }
        }
    }
}

impl Default for SystemInspector {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl ProcessInspector for SystemInspector {
    fn command_line(&self, pid: u32) -> Option<String> {
        let pid_arg = pid.to_string();
        let output = self.query("ps", &["-p", &pid_arg, "-o", "command="], pid)?;
        parse_command_line(&output)
    }

    fn working_directory(&self, pid: u32) -> Option<String> {
        let pid_arg = pid.to_string();
        let output = self.query("lsof", &["-a", "-p", &pid_arg, "-d", "cwd", "-Fn"], pid)?;
        parse_cwd_output(&output)
    }

    fn executable_path(&self, pid: u32) -> Option<String> {
        native_executable_path(pid)
    }
}

/// Primera línea no vacía de la salida de `ps`, recortada.
fn parse_command_line(output: &str) -> Option<String> {
    let trimmed = output.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Busca la primera línea que empieza por el centinela `n` y devuelve el resto.
///
/// Formato de `lsof -Fn`:
/// ```text
/// p8123
/// fcwd
/// n/Users/me/code/app
/// ```
fn parse_cwd_output(output: &str) -> Option<String> {
    let line = output.lines().find(|line| line.starts_with(CWD_SENTINEL))?;
    let path = &line[CWD_SENTINEL.len_utf8()..];
    (!path.is_empty()).then(|| path.to_string())
}

#[cfg(target_os = "linux")]
fn native_executable_path(pid: u32) -> Option<String> {
    std::fs::read_link(format!("/proc/{}/exe", pid))
        .ok()
        .map(|path| path.to_string_lossy().into_owned())
}

#[cfg(target_os = "macos")]
fn native_executable_path(pid: u32) -> Option<String> {
    let pid = i32::try_from(pid).ok()?;
    libproc::libproc::proc_pid::pidpath(pid).ok()
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn native_executable_path(_pid: u32) -> Option<String> {
    None
}

/// Envía SIGTERM (o SIGKILL si `force`) a un proceso.
///
/// # Arguments
/// * `pid` - ID del proceso a terminar
/// * `force` - Usar SIGKILL en lugar de SIGTERM
///
/// # Returns
/// `true` si la señal se entregó, `false` si el proceso no existe o no hay
/// permisos.
pub fn terminate(pid: u32, force: bool) -> bool {
    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    let signal = if force { Signal::SIGKILL } else { Signal::SIGTERM };

    log::info!("Enviando {} al proceso {}", signal, pid);
    match kill(Pid::from_raw(raw), signal) {
        Ok(()) => true,
        Err(e) => {
            log::warn!("No se pudo enviar {} al proceso {}: {}", signal, pid, e);
            false
        }
    }
}

/// Termina cada PID distinto una sola vez.
///
/// # Returns
/// Cantidad de procesos a los que se entregó la señal.
pub fn terminate_all(pids: impl IntoIterator<Item = u32>, force: bool) -> usize {
    // Recopilar PIDs únicos para no señalar dos veces el mismo proceso
    let mut unique_pids: Vec<u32> = pids.into_iter().collect();
    unique_pids.sort_unstable();
    unique_pids.dedup();

    unique_pids
        .into_iter()
        .filter(|&pid| terminate(pid, force))
        .count()
}

/// Usuario y directorio personal de quien ejecuta la aplicación.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostIdentity {
    pub user: String,
    pub home: PathBuf,
}

impl HostIdentity {
    pub fn new(user: impl Into<String>, home: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            home: home.into(),
        }
    }

    /// Resuelve el usuario actual vía getpwuid, con `$USER`/`$HOME` de respaldo.
    pub fn current() -> Self {
        match User::from_uid(getuid()) {
            Ok(Some(user)) => Self::new(user.name, user.dir),
            Ok(None) | Err(_) => {
                log::warn!("No se pudo resolver el usuario actual, usando variables de entorno");
                Self::new(
                    std::env::var("USER").unwrap_or_default(),
                    std::env::var("HOME").unwrap_or_default(),
                )
            }
        }
    }

    /// Directorio personal como texto, para comparaciones de prefijo.
    pub fn home_str(&self) -> String {
        self.home.to_string_lossy().into_owned()
    }
}
