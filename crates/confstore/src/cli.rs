use std::path::Path;

use confstore_core::kernel::{Application, ApplicationServices};
use confstore_core::scheme::{Scheme, SchemeManager, SchemeProcessor};
use confstore_core::storage::macros::contains_macro;
use confstore_core::storage::state_storage::{from_component_element, states_from_document};
use confstore_core::storage::StorageSystemError;
use confstore_core::utils::fs::write_atomically;
use confstore_core::xml::{self, binary};
use confstore_core::{EngineConfig, Element, Error, Result};

pub fn expand(config: &EngineConfig, spec: &str) -> Result<()> {
    let app = Application::new(config.clone(), ApplicationServices::default());
    let manager = app.app_store().storage_manager();
    let normalized = manager.normalize_file_spec(spec)?;
    println!("{}", manager.expand_file_spec(&normalized)?.display());
    Ok(())
}

pub fn collapse(config: &EngineConfig, path: &str) -> Result<()> {
    let app = Application::new(config.clone(), ApplicationServices::default());
    let manager = app.app_store().storage_manager();
    let collapsed = manager.macros().collapse(path);
    if contains_macro(&collapsed) {
        println!("{}", manager.normalize_file_spec(&collapsed)?);
    } else {
        println!("{}", collapsed);
    }
    Ok(())
}

async fn read(path: &Path) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| Error::io(e, "read", path.to_path_buf()))
}

fn parse(path: &Path, bytes: &[u8]) -> Result<Element> {
    xml::parse(bytes).map_err(|e| StorageSystemError::xml(e, path.to_path_buf()).into())
}

pub async fn show(file: &Path, component: Option<&str>) -> Result<()> {
    let root = parse(file, &read(file).await?)?;
    let states = states_from_document(&root);
    match component {
        None => {
            for name in states.keys() {
                println!("{}", name);
            }
        }
        Some(name) => {
            let fragment = states
                .get(name)
                .ok_or_else(|| Error::Other(format!("{} holds no component '{}'", file.display(), name)))?;
            print!("{}", from_component_element(fragment).to_xml_string());
        }
    }
    Ok(())
}

pub async fn cache_dump(file: &Path) -> Result<()> {
    let bytes = read(file).await?;
    let root = binary::decode(&bytes).map_err(|e| StorageSystemError::xml(e, file.to_path_buf()))?;
    print!("{}", root.to_xml_string());
    Ok(())
}

pub async fn cache_encode(xml_file: &Path, output: &Path) -> Result<()> {
    let root = parse(xml_file, &read(xml_file).await?)?;
    let encoded = binary::encode(&root);
    write_atomically(output, &encoded, false)?;
    log::info!("Wrote {} bytes to {}", encoded.len(), output.display());
    Ok(())
}

/// Scheme kept as its stored document
#[derive(Debug)]
struct RawScheme {
    name: String,
    root: Element,
}

impl Scheme for RawScheme {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
        self.root.set_attribute("name", name);
    }
}

struct RawProcessor;

impl SchemeProcessor<RawScheme> for RawProcessor {
    fn read_scheme(&self, root: Element) -> Result<RawScheme> {
        let name = root
            .attribute("name")
            .ok_or_else(|| Error::from("scheme root has no name attribute"))?
            .to_string();
        Ok(RawScheme { name, root })
    }

    fn write_scheme(&self, scheme: &RawScheme) -> Result<Element> {
        Ok(scheme.root.clone())
    }
}

pub fn schemes(dir: &Path, extension: &str) -> Result<()> {
    let dir_spec = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut manager = SchemeManager::new(dir_spec, dir.to_path_buf(), RawProcessor).with_extension(extension);
    for failure in manager.load_schemes()? {
        eprintln!("Skipped: {}", failure);
    }
    for name in manager.scheme_names() {
        let tag = manager
            .find_scheme(&name)?
            .map(|scheme| scheme.root.name().to_string())
            .unwrap_or_default();
        println!("{}\t{}", name, tag);
    }
    Ok(())
}
