/// Configuración de la aplicación y su almacenamiento persistente.
///
/// `Settings` es un valor plano que cada ciclo lee como una copia
/// consistente. `SettingsStore` lo guarda en TOML y publica cada cambio por
/// un canal a quien se haya suscrito (el poller).
use std::fs;
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};

use crate::error::SettingsError;

/// Nombre de la carpeta de configuración
const APP_DIR: &str = "porticide";

/// Nombre del archivo de configuración
const SETTINGS_FILE: &str = "settings.toml";

/// Intervalo máximo aceptado entre ciclos (un día)
pub const MAX_REFRESH_INTERVAL_SECS: f64 = 86_400.0;

/// Configuración del inventario y de la presentación.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Primer puerto del rango vigilado (inclusivo)
    pub port_start: u16,
    /// Último puerto del rango vigilado (inclusivo)
    pub port_end: u16,
    /// Segundos entre ciclos automáticos
    pub refresh_interval_secs: f64,
    /// Mostrar procesos del sistema y de otros usuarios
    pub show_system_processes: bool,
    // Sólo presentación
    pub confirm_before_kill: bool,
    pub launch_at_login: bool,
    pub show_notifications: bool,
    pub show_detailed: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            port_start: 3000,
            port_end: 9999,
            refresh_interval_secs: 3.0,
            show_system_processes: false,
            confirm_before_kill: true,
            launch_at_login: false,
            show_notifications: false,
            show_detailed: false,
        }
    }
}

impl Settings {
    /// Rango inclusivo de puertos a conservar en el parser.
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.port_start..=self.port_end
    }

    /// Intervalo entre ciclos como `Duration`.
    ///
    /// Un valor que no cabe en `Duration` (sólo posible si se saltó
    /// `validate`) se acota a `MAX_REFRESH_INTERVAL_SECS`.
    pub fn refresh_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.refresh_interval_secs)
            .unwrap_or(Duration::from_secs(MAX_REFRESH_INTERVAL_SECS as u64))
            .min(Duration::from_secs(MAX_REFRESH_INTERVAL_SECS as u64))
    }

    /// Comprueba rango e intervalo.
    ///
    /// # Returns
    /// `Err(SettingsError::Invalid)` si el rango está invertido, incluye el
    /// puerto 0 o el intervalo no es un número positivo de como mucho
    /// `MAX_REFRESH_INTERVAL_SECS` segundos.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.port_start == 0 {
            return Err(SettingsError::Invalid("port_start debe ser >= 1".into()));
        }
        if self.port_start > self.port_end {
            return Err(SettingsError::Invalid(format!(
                "rango invertido: {}-{}",
                self.port_start, self.port_end
            )));
        }
        if !self.refresh_interval_secs.is_finite() || self.refresh_interval_secs <= 0.0 {
            return Err(SettingsError::Invalid(format!(
                "refresh_interval_secs debe ser positivo, no {}",
                self.refresh_interval_secs
            )));
        }
        if self.refresh_interval_secs > MAX_REFRESH_INTERVAL_SECS {
            return Err(SettingsError::Invalid(format!(
                "refresh_interval_secs no puede superar {}, no {}",
                MAX_REFRESH_INTERVAL_SECS, self.refresh_interval_secs
            )));
        }
        Ok(())
    }
}

/// Ruta por defecto: `$XDG_CONFIG_HOME/porticide/settings.toml` o
/// `$HOME/.config/porticide/settings.toml`.
pub fn default_settings_path() -> PathBuf {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config")))
        .unwrap_or_else(|| PathBuf::from("."));
    base.join(APP_DIR).join(SETTINGS_FILE)
}

/// Dueño de la configuración: la persiste y notifica los cambios.
#[derive(Debug)]
pub struct SettingsStore {
    path: PathBuf,
    current: Settings,
    subscribers: Vec<Sender<Settings>>,
}

impl SettingsStore {
    /// Carga la configuración desde `path`.
    ///
    /// Un archivo inexistente equivale a los valores por defecto.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, SettingsError> {
        let path = path.into();
        let current = read_settings(&path)?;
        Ok(Self {
            path,
            current,
            subscribers: Vec::new(),
        })
    }

    /// Como `load`, pero ante un archivo inválido usa los valores por defecto.
    pub fn load_or_default(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        match read_settings(&path) {
            Ok(current) => Self {
                path,
                current,
                subscribers: Vec::new(),
            },
            Err(e) => {
                log::warn!(
                    "Configuración en {} ignorada ({}), usando valores por defecto",
                    path.display(),
                    e
                );
                Self {
                    path,
                    current: Settings::default(),
                    subscribers: Vec::new(),
                }
            }
        }
    }

    /// Copia de la configuración vigente.
    pub fn current(&self) -> Settings {
        self.current.clone()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Canal que recibe cada nueva configuración tras una modificación.
    pub fn subscribe(&mut self) -> Receiver<Settings> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Aplica una modificación del usuario, la valida, la guarda y la publica.
    ///
    /// Si la validación o el guardado fallan, la configuración vigente no
    /// cambia y no se notifica a nadie.
    pub fn update(&mut self, change: impl FnOnce(&mut Settings)) -> Result<(), SettingsError> {
        let mut next = self.current.clone();
        change(&mut next);
        if next == self.current {
            return Ok(());
        }
        next.validate()?;
        write_settings(&self.path, &next)?;

        log::info!(
            "Configuración actualizada: puertos {}-{}, intervalo {}s, sistema={}",
            next.port_start,
            next.port_end,
            next.refresh_interval_secs,
            next.show_system_processes
        );
        self.current = next;

        // Descartar suscriptores que ya no escuchan
        let current = &self.current;
        self.subscribers.retain(|tx| tx.send(current.clone()).is_ok());
        Ok(())
    }
}

fn read_settings(path: &Path) -> Result<Settings, SettingsError> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Settings::default()),
        Err(e) => return Err(e.into()),
    };
    let settings: Settings = toml::from_str(&content)?;
    settings.validate()?;
    Ok(settings)
}

fn write_settings(path: &Path, settings: &Settings) -> Result<(), SettingsError> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}
