/// Tipos de error del motor de inventario.
///
/// Sólo los fallos del escaneo de sockets y de la configuración llegan al
/// usuario. La falta de metadatos de un proceso nunca es un error: el campo
/// afectado simplemente queda vacío.
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Fallo al ejecutar una herramienta externa (`lsof`, `ps`).
#[derive(Error, Debug)]
pub enum ToolError {
    /// El binario no se pudo lanzar (no existe, sin permisos...)
    #[error("no se pudo lanzar `{program}`: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    /// Error leyendo la salida o esperando al proceso hijo
    #[error("error de E/S con `{program}`: {source}")]
    Io {
        program: String,
        #[source]
        source: io::Error,
    },

    /// La herramienta no terminó dentro del límite de tiempo
    #[error("`{program}` no respondió en {after:?}")]
    TimedOut { program: String, after: Duration },
}

/// Fallo del escaneo de sockets. Aborta el ciclo y conserva el snapshot previo.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// La herramienta terminó con un código no reconocido o por una señal
    #[error("`{program}` terminó de forma anormal ({status})")]
    AbnormalExit { program: String, status: String },
}

/// Fallo al cargar, validar o guardar la configuración.
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("error de E/S en la configuración: {0}")]
    Io(#[from] io::Error),

    #[error("configuración TOML inválida: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("no se pudo serializar la configuración: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("valor de configuración inválido: {0}")]
    Invalid(String),
}
