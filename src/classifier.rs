/// Clasificación heurística del servicio a partir de la línea de comandos.
///
/// Las reglas forman una lista ordenada y gana la primera que coincide, así
/// que el orden de `RULES` es parte del comportamiento: una línea con
/// "next dev" y "node" debe caer en la regla de Next antes que en la de Node.
use std::sync::OnceLock;

use regex::Regex;

/// Categoría de ícono de un servicio (conjunto fijo).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IconCategory {
    Sparkles,
    Redirect,
    Bolt,
    Flame,
    Leaf,
    Drop,
    PaperPlane,
    Shield,
    Hare,
    Container,
    Code,
    Terminal,
    Unknown,
}

impl IconCategory {
    /// Nombre de ícono del tema freedesktop usado por el tray.
    pub fn icon_name(&self) -> &'static str {
        match self {
            IconCategory::Sparkles => "applications-science",
            IconCategory::Redirect => "go-next",
            IconCategory::Bolt => "weather-storm",
            IconCategory::Flame => "software-update-urgent",
            IconCategory::Leaf => "applications-internet",
            IconCategory::Drop => "applications-engineering",
            IconCategory::PaperPlane => "mail-send",
            IconCategory::Shield => "security-high",
            IconCategory::Hare => "media-seek-forward",
            IconCategory::Container => "package-x-generic",
            IconCategory::Code => "applications-development",
            IconCategory::Terminal => "utilities-terminal",
            IconCategory::Unknown => "dialog-question",
        }
    }
}

/// Resultado de la clasificación. Derivado, nunca se persiste.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceInfo {
    /// Nombre legible, nunca vacío
    pub display_name: String,
    /// Detalle corto opcional (versión, archivo compose...)
    pub detail: Option<String>,
    pub icon: IconCategory,
}

impl ServiceInfo {
    fn new(display_name: &str, detail: Option<String>, icon: IconCategory) -> Self {
        Self {
            display_name: display_name.to_string(),
            detail,
            icon,
        }
    }
}

/// Condición de coincidencia sobre la línea en minúsculas.
enum Matcher {
    /// Basta con cualquiera de las subcadenas
    Any(&'static [&'static str]),
    /// Tienen que estar todas
    All(&'static [&'static str]),
}

impl Matcher {
    fn matches(&self, lower: &str) -> bool {
        match self {
            Matcher::Any(needles) => needles.iter().any(|n| lower.contains(n)),
            Matcher::All(needles) => needles.iter().all(|n| lower.contains(n)),
        }
    }
}

/// Cómo se obtiene el detalle de una regla.
enum DetailSource {
    None,
    /// Patrón `vX.Y.Z` en la línea original
    Version,
    /// Valor que sigue a `-f` / `--file`
    ComposeFile,
}

struct Rule {
    matcher: Matcher,
    display_name: &'static str,
    detail: DetailSource,
    icon: IconCategory,
}

/// Reglas en orden de prioridad.
const RULES: &[Rule] = &[
    Rule {
        matcher: Matcher::Any(&["streamlit"]),
        display_name: "streamlit",
        detail: DetailSource::Version,
        icon: IconCategory::Sparkles,
    },
    Rule {
        matcher: Matcher::Any(&["next dev", "next-server"]),
        display_name: "next-server",
        detail: DetailSource::Version,
        icon: IconCategory::Redirect,
    },
    Rule {
        matcher: Matcher::Any(&["vite"]),
        display_name: "vite-dev-server",
        detail: DetailSource::Version,
        icon: IconCategory::Bolt,
    },
    Rule {
        matcher: Matcher::Any(&["webpack"]),
        display_name: "webpack-hot-reload",
        detail: DetailSource::Version,
        icon: IconCategory::Flame,
    },
    Rule {
        matcher: Matcher::All(&["django", "runserver"]),
        display_name: "django-runserver",
        detail: DetailSource::None,
        icon: IconCategory::Leaf,
    },
    Rule {
        matcher: Matcher::Any(&["flask"]),
        display_name: "flask",
        detail: DetailSource::None,
        icon: IconCategory::Drop,
    },
    Rule {
        matcher: Matcher::Any(&["uvicorn"]),
        display_name: "uvicorn",
        detail: DetailSource::None,
        icon: IconCategory::PaperPlane,
    },
    Rule {
        matcher: Matcher::Any(&["gunicorn"]),
        display_name: "gunicorn",
        detail: DetailSource::None,
        icon: IconCategory::Shield,
    },
    Rule {
        matcher: Matcher::Any(&["bun"]),
        display_name: "bun",
        detail: DetailSource::Version,
        icon: IconCategory::Hare,
    },
    Rule {
        matcher: Matcher::Any(&["docker"]),
        display_name: "docker",
        detail: DetailSource::ComposeFile,
        icon: IconCategory::Container,
    },
    Rule {
        matcher: Matcher::Any(&["node"]),
        display_name: "node",
        detail: DetailSource::None,
        icon: IconCategory::Code,
    },
    Rule {
        matcher: Matcher::Any(&["python"]),
        display_name: "python",
        detail: DetailSource::None,
        icon: IconCategory::Code,
    },
];

/// Nombre usado cuando la línea no tiene ningún token
const FALLBACK_NAME: &str = "process";

/// Clasifica una línea de comandos. Función pura y total.
///
/// # Arguments
/// * `command_line` - Línea completa del proceso, si se pudo obtener
///
/// # Returns
/// `ServiceInfo` con `display_name` no vacío. Sin línea de comandos se
/// devuelve "Unknown" con ícono neutro.
pub fn classify(command_line: Option<&str>) -> ServiceInfo {
    let Some(command_line) = command_line else {
        return ServiceInfo::new("Unknown", None, IconCategory::Unknown);
    };

    let lower = command_line.to_lowercase();
    if let Some(rule) = RULES.iter().find(|rule| rule.matcher.matches(&lower)) {
        let detail = match rule.detail {
            DetailSource::None => None,
            DetailSource::Version => extract_version(command_line),
            DetailSource::ComposeFile => extract_flag_value(command_line, &["-f", "--file"]),
        };
        return ServiceInfo::new(rule.display_name, detail, rule.icon);
    }

    let first_token = command_line.split_whitespace().next().unwrap_or(FALLBACK_NAME);
    ServiceInfo::new(first_token, None, IconCategory::Terminal)
}

/// Busca `v<mayor>.<menor>.<parche>` y lo devuelve con el prefijo `v`.
pub fn extract_version(command_line: &str) -> Option<String> {
    static VERSION: OnceLock<Option<Regex>> = OnceLock::new();
    VERSION
        .get_or_init(|| Regex::new(r"v(\d+\.\d+\.\d+)").ok())
        .as_ref()?
        .captures(command_line)
        .and_then(|caps| caps.get(1))
        .map(|m| format!("v{}", m.as_str()))
}

/// Valor del primer flag de `flags` que vaya seguido de otro token.
fn extract_flag_value(command_line: &str, flags: &[&str]) -> Option<String> {
    let parts: Vec<&str> = command_line.split_whitespace().collect();
    parts
        .windows(2)
        .find(|pair| flags.contains(&pair[0]))
        .map(|pair| pair[1].to_string())
}
