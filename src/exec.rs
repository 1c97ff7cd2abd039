/// Ejecución de herramientas externas con límite de tiempo.
///
/// Todas las consultas al sistema (`lsof`, `ps`) pasan por aquí. La salida
/// estándar se lee completa en un hilo auxiliar; si el proceso no termina
/// dentro del plazo se mata y se devuelve `ToolError::TimedOut`.
use std::io::Read;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use crossbeam_channel::RecvTimeoutError;

use crate::error::ToolError;

/// Límite por defecto para cada invocación externa
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Resultado de una herramienta que terminó dentro del plazo.
#[derive(Debug)]
pub struct ToolOutput {
    /// Estado de salida del proceso
    pub status: ExitStatus,
    /// Salida estándar decodificada (bytes inválidos reemplazados)
    pub stdout: String,
}

/// Ejecuta `program` con `args` y espera su salida como máximo `timeout`.
///
/// stderr se descarta: su contenido nunca afecta al resultado.
///
/// # Arguments
/// * `program` - Binario a ejecutar (se resuelve vía PATH)
/// * `args` - Argumentos fijos de la consulta
/// * `timeout` - Tiempo máximo de espera
///
/// # Returns
/// `Ok(ToolOutput)` si el proceso terminó, `Err(ToolError)` si no se pudo
/// lanzar, falló la lectura o se agotó el plazo.
pub fn run_tool(program: &str, args: &[&str], timeout: Duration) -> Result<ToolOutput, ToolError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|source| ToolError::Launch {
            program: program.to_string(),
            source,
        })?;

    let io_error = |source: std::io::Error| ToolError::Io {
        program: program.to_string(),
        source,
    };

    let mut stdout = child.stdout.take().ok_or_else(|| {
        io_error(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "stdout no disponible",
        ))
    })?;

    // El lector termina al cerrarse el pipe (fin del proceso o kill)
    let (tx, rx) = crossbeam_channel::bounded(1);
    thread::spawn(move || {
        let mut buffer = Vec::new();
        let result = stdout.read_to_end(&mut buffer).map(|_| buffer);
        let _ = tx.send(result);
    });

    let bytes = match rx.recv_timeout(timeout) {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(source)) => {
            reap(&mut child);
            return Err(io_error(source));
        }
        Err(RecvTimeoutError::Timeout) => {
            log::warn!("`{}` superó el límite de {:?}, terminándolo", program, timeout);
            reap(&mut child);
            return Err(ToolError::TimedOut {
                program: program.to_string(),
                after: timeout,
            });
        }
        Err(RecvTimeoutError::Disconnected) => {
            reap(&mut child);
            return Err(io_error(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "el lector de stdout terminó sin resultado",
            )));
        }
    };

    let status = child.wait().map_err(io_error)?;

    Ok(ToolOutput {
        status,
        stdout: String::from_utf8_lossy(&bytes).into_owned(),
    })
}

/// Mata y recoge un proceso hijo, ignorando errores (puede haber terminado ya).
fn reap(child: &mut std::process::Child) {
    let _ = child.kill();
    let _ = child.wait();
}
