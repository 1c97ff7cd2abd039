/// Módulo de escaneo de puertos en escucha.
/// Consulta los sockets TCP (LISTEN) y UDP abiertos con `lsof` y parsea
/// la tabla resultante en registros estructurados.
use std::ops::RangeInclusive;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

use crate::error::ScanError;
use crate::exec::{self, DEFAULT_TOOL_TIMEOUT};
use crate::model::{Protocol, SocketRecord};

/// Binario usado para listar sockets
const LSOF: &str = "lsof";

/// Sólo TCP en LISTEN y UDP, sin resolver hosts ni puertos
const LSOF_ARGS: [&str; 5] = ["-n", "-P", "-iTCP", "-sTCP:LISTEN", "-iUDP"];

/// Columnas mínimas de una fila de datos de lsof (COMMAND .. NAME)
const MIN_COLUMNS: usize = 9;

/// Fuente del texto crudo de sockets. Permite sustituir lsof en pruebas.
pub trait SocketSource: Send {
    /// Devuelve la tabla de sockets tal como la imprime la herramienta.
    fn scan(&self) -> Result<String, ScanError>;
}

/// Escáner real basado en `lsof`.
#[derive(Debug, Clone)]
pub struct LsofScanner {
    timeout: Duration,
}

impl LsofScanner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for LsofScanner {
    fn default() -> Self {
        Self::new(DEFAULT_TOOL_TIMEOUT)
    }
}

impl SocketSource for LsofScanner {
    /// Ejecuta `lsof -n -P -iTCP -sTCP:LISTEN -iUDP`.
    ///
    /// lsof sale con 1 cuando no encuentra sockets o cuando hubo avisos
    /// parciales; en ambos casos su salida es válida y se consume.
    ///
    /// # Returns
    /// `Ok(String)` con la tabla cruda, `Err(ScanError)` si lsof no se pudo
    /// lanzar, se colgó o terminó de forma anormal.
    fn scan(&self) -> Result<String, ScanError> {
        let output = exec::run_tool(LSOF, &LSOF_ARGS, self.timeout)?;

        match output.status.code() {
            Some(0) | Some(1) => Ok(output.stdout),
            _ => Err(ScanError::AbnormalExit {
                program: LSOF.to_string(),
                status: output.status.to_string(),
            }),
        }
    }
}

/// Parsea la salida de `lsof` en registros de socket.
///
/// Formato esperado (la primera línea es la cabecera):
/// ```text
/// COMMAND   PID USER   FD   TYPE             DEVICE SIZE/OFF NODE NAME
/// node     8123 me     23u  IPv4 0x000000000000 0t0  TCP *:3000 (LISTEN)
/// ```
///
/// Las líneas que no se pueden interpretar se descartan en silencio. No se
/// deduplica: un mismo PID puede aparecer una vez por socket.
///
/// # Arguments
/// * `output` - Salida cruda de lsof
/// * `port_range` - Rango inclusivo de puertos a conservar
///
/// # Returns
/// Registros en el mismo orden en que aparecen en la salida.
pub fn parse_lsof_output(output: &str, port_range: RangeInclusive<u16>) -> Vec<SocketRecord> {
    output
        .lines()
        .skip(1)
        .filter_map(parse_single_line)
        .filter(|record| port_range.contains(&record.port))
        .collect()
}

/// Parsea una fila de datos de lsof.
///
/// # Returns
/// `Some(SocketRecord)` si la fila tiene al menos 9 columnas, un PID
/// numérico y un puerto reconocible; `None` en caso contrario.
fn parse_single_line(line: &str) -> Option<SocketRecord> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < MIN_COLUMNS {
        log::trace!("Línea de lsof ignorada (columnas insuficientes): {}", line);
        return None;
    }

    let pid: u32 = parts[1].parse().ok()?;
    let user = parts[2];
    let name_field = parts[8..].join(" ");
    let port = extract_port(&name_field)?;
    // El marcador TCP/UDP vive en la columna NODE, justo antes de NAME
    let protocol = extract_protocol(&parts[7..]);

    Some(SocketRecord {
        port,
        pid,
        command: parts[0].to_string(),
        user: (!user.is_empty()).then(|| user.to_string()),
        protocol,
    })
}

/// Detecta el protocolo buscando literalmente "TCP" o "UDP" desde NODE.
fn extract_protocol(columns: &[&str]) -> Protocol {
    if columns.iter().any(|c| c.contains("TCP")) {
        Protocol::Tcp
    } else if columns.iter().any(|c| c.contains("UDP")) {
        Protocol::Udp
    } else {
        Protocol::Unknown
    }
}

/// Extrae el puerto: la última secuencia de dígitos precedida de `:`.
///
/// Maneja IPv4 (`127.0.0.1:8000`), comodín (`*:3000`) e IPv6
/// (`[::1]:5432`). Los valores fuera de 1..=65535 descartan la línea.
fn extract_port(name_field: &str) -> Option<u16> {
    static PORT: OnceLock<Option<Regex>> = OnceLock::new();
    let digits = PORT
        .get_or_init(|| Regex::new(r":(\d+)").ok())
        .as_ref()?
        .captures_iter(name_field)
        .filter_map(|caps| caps.get(1))
        .last()?;

    match digits.as_str().parse::<u16>() {
        Ok(port) if port > 0 => Some(port),
        _ => None,
    }
}
