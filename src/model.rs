/// Entidades del snapshot: registros crudos del escaneo y entradas enriquecidas.
use std::fmt;
use std::time::SystemTime;

use crate::classifier::{self, ServiceInfo};

/// Protocolo del socket tal como aparece en la columna NODE de lsof.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Tcp,
    Udp,
    Unknown,
}

impl Protocol {
    /// Etiqueta corta para mostrar en menús y en consola.
    pub fn label(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Unknown => "?",
        }
    }
}

/// Una fila de lsof ya interpretada, antes de consultar metadatos.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SocketRecord {
    /// Puerto local extraído de la columna NAME
    pub port: u16,
    /// PID del proceso dueño del socket
    pub pid: u32,
    /// Nombre corto del proceso (lsof puede truncarlo)
    pub command: String,
    /// Usuario dueño del proceso según lsof
    pub user: Option<String>,
    /// TCP o UDP según la columna NODE
    pub protocol: Protocol,
}

/// Un puerto en escucha asociado a su proceso, con los datos enriquecidos.
///
/// Es un valor inmutable: cada ciclo reconstruye el conjunto completo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortEntry {
    /// Puerto local en escucha
    pub port: u16,
    /// PID del proceso dueño del socket
    pub pid: u32,
    /// Nombre del proceso usado por el filtro de ruido
    pub process_name: String,
    /// Nombre corto tal como lo reporta lsof
    pub command: String,
    /// Línea de comandos completa; ausente si el proceso ya no existe
    pub command_line: Option<String>,
    /// Usuario dueño del proceso según lsof
    pub user: Option<String>,
    /// TCP o UDP según la columna NODE
    pub protocol: Protocol,
    /// Ruta absoluta del ejecutable
    pub path: Option<String>,
    /// Raíz del proyecto (o directorio de trabajo) abreviada con `~`
    pub project_path: Option<String>,
    /// Las herramientas usadas no dan una hora de inicio fiable; siempre `None`
    pub started_at: Option<SystemTime>,
}

impl PortEntry {
    /// Entrada sin metadatos a partir de un registro del escaneo.
    pub fn from_record(record: &SocketRecord) -> Self {
        Self {
            port: record.port,
            pid: record.pid,
            process_name: record.command.clone(),
            command: record.command.clone(),
            command_line: None,
            user: record.user.clone(),
            protocol: record.protocol,
            path: None,
            project_path: None,
            started_at: None,
        }
    }

    /// Identidad estable entre ciclos: `"<puerto>-<pid>"`.
    pub fn id(&self) -> String {
        format!("{}-{}", self.port, self.pid)
    }

    /// Servicio clasificado a partir de la línea de comandos.
    pub fn service(&self) -> ServiceInfo {
        classifier::classify(self.command_line.as_deref())
    }
}

impl fmt::Display for PortEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}: {} (PID: {})",
            self.protocol.label(),
            self.port,
            self.service().display_name,
            self.pid
        )
    }
}
