/// Resolución de la raíz del proyecto y abreviado de rutas con `~`.
use std::path::{Path, PathBuf};

/// Directorio que marca la raíz de un repositorio
const VCS_MARKER: &str = ".git";

/// Alias del directorio personal
pub const HOME_ALIAS: &str = "~";

/// Sube por los ancestros de `cwd` hasta encontrar un directorio `.git`.
///
/// # Arguments
/// * `cwd` - Directorio de trabajo del proceso
///
/// # Returns
/// La primera carpeta que contiene `.git`; si se llega a la raíz sin
/// encontrarla, el propio `cwd` sin cambios. `None` sólo si no hay entrada.
pub fn resolve_root(cwd: Option<&str>) -> Option<String> {
    let cwd = cwd?;

    let found = Path::new(cwd)
        .ancestors()
        .find(|dir| !dir.as_os_str().is_empty() && dir.join(VCS_MARKER).is_dir());

    match found {
        Some(root) => Some(root.to_string_lossy().into_owned()),
        None => Some(cwd.to_string()),
    }
}

/// Reemplaza el prefijo del directorio personal por `~`.
///
/// La comparación es por componentes: con home `/home/me`, la ruta
/// `/home/me2` no se abrevia.
pub fn tilde_path(path: &str, home: &Path) -> String {
    if home.as_os_str().is_empty() {
        return path.to_string();
    }

    match Path::new(path).strip_prefix(home) {
        Ok(rest) if rest.as_os_str().is_empty() => HOME_ALIAS.to_string(),
        Ok(rest) => PathBuf::from(HOME_ALIAS).join(rest).to_string_lossy().into_owned(),
        Err(_) => path.to_string(),
    }
}

/// Normalización del enriquecimiento: `/` y la cadena vacía no aportan nada.
pub fn normalize_project_path(path: Option<String>) -> Option<String> {
    path.filter(|p| !p.is_empty() && p != "/")
}

/// Rutas que resuelven a la raíz del sistema o del home sin sufijo.
pub fn is_unusable_project_path(path: &str) -> bool {
    path.is_empty() || path == "/" || path == HOME_ALIAS
}

/// Raíz del proyecto de `cwd`, abreviada y normalizada.
pub fn display_project_path(cwd: Option<&str>, home: &Path) -> Option<String> {
    let root = resolve_root(cwd)?;
    normalize_project_path(Some(tilde_path(&root, home)))
}
