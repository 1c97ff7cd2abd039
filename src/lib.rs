//! # Porticide 🔪
//!
//! Inventario en vivo de los puertos en escucha de la estación de trabajo.
//!
//! Cada ciclo descubre qué procesos escuchan en qué puertos (`lsof`), los
//! enriquece con su línea de comandos, directorio de proyecto y ejecutable,
//! filtra el ruido del sistema, deduplica por puerto y publica un snapshot
//! ordenado.
//!
//! ## Flujo de un ciclo
//! ```text
//! lsof → port_scanner → process_info + project_path → noise_filter → poller
//! ```

pub mod classifier;
pub mod error;
pub mod exec;
pub mod model;
pub mod noise_filter;
pub mod poller;
pub mod port_scanner;
pub mod process_info;
pub mod project_path;
pub mod settings;

pub use classifier::{classify, IconCategory, ServiceInfo};
pub use error::{ScanError, SettingsError, ToolError};
pub use model::{PortEntry, Protocol, SocketRecord};
pub use poller::{deliver, InventoryView, Poller, PollerEvent, PollerHandle, PollerRemote, Snapshot, Subscriber};
pub use port_scanner::{LsofScanner, SocketSource};
pub use process_info::{terminate, HostIdentity, ProcessInspector, SystemInspector};
pub use settings::{Settings, SettingsStore};
