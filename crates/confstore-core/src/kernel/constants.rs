/// Application name
pub const APP_NAME: &str = "confstore";

/// Application version
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Root of the application configuration (the directory holding `options/`)
pub const ROOT_CONFIG_MACRO: &str = "$ROOT_CONFIG$";

/// Application options directory
pub const APP_CONFIG_MACRO: &str = "$APP_CONFIG$";

/// Application cache directory (binary caches)
pub const CACHE_DIR_MACRO: &str = "$CACHE_DIR$";

/// Project configuration directory
pub const PROJECT_CONFIG_DIR_MACRO: &str = "$PROJECT_CONFIG_DIR$";

/// Per-user project workspace file
pub const WORKSPACE_FILE_MACRO: &str = "$WORKSPACE_FILE$";

/// Module file and its directory
pub const MODULE_FILE_MACRO: &str = "$MODULE_FILE$";
pub const MODULE_DIR_MACRO: &str = "$MODULE_DIR$";

/// Name of the options directory under the root config directory
pub const OPTIONS_DIR_NAME: &str = "options";

/// Name of the project configuration directory inside a project
pub const PROJECT_CONFIG_DIR_NAME: &str = ".confstore";

/// Workspace file name inside the project configuration directory
pub const WORKSPACE_FILE_NAME: &str = "workspace.xml";

/// Default storage of application components without an explicit storage
pub const DEFAULT_APP_FILE_SPEC: &str = "options/other.xml";

/// Default storage of project components without an explicit storage
pub const DEFAULT_PROJECT_FILE_SPEC: &str = "misc.xml";

/// Extension of module files
pub const MODULE_FILE_EXTENSION: &str = "iml";

/// Default extension of scheme files
pub const DEFAULT_SCHEME_EXTENSION: &str = ".xml";

/// Tag wrapping one component state in a shared file
pub const COMPONENT_TAG: &str = "component";
