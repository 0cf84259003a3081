use std::path::Path;

use tempfile::TempDir;

use crate::config::EngineConfig;
use crate::kernel::error::{Error, Result};
use crate::kernel::{Application, ApplicationServices};
use crate::scheme::{Scheme, SchemeManager, SchemeProcessor};
use crate::storage::descriptor::RoamingType;
use crate::tests::common::{read_string, MemoryStreamProvider};
use crate::xml::Element;

#[derive(Debug, Clone)]
struct Theme {
    name: String,
    accent: String,
}

impl Scheme for Theme {
    fn name(&self) -> &str {
        &self.name
    }

    fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }
}

struct ThemeProcessor;

impl SchemeProcessor<Theme> for ThemeProcessor {
    fn read_scheme(&self, element: Element) -> Result<Theme> {
        Ok(Theme {
            name: element.attribute("name").ok_or_else(|| Error::from("theme without name"))?.to_string(),
            accent: element.attribute("accent").unwrap_or("none").to_string(),
        })
    }

    fn write_scheme(&self, theme: &Theme) -> Result<Element> {
        Ok(Element::new("theme")
            .with_attribute("name", theme.name.as_str())
            .with_attribute("accent", theme.accent.as_str()))
    }
}

fn themes(app: &Application) -> SchemeManager<Theme, ThemeProcessor> {
    let dir = app.config().options_dir().join("themes");
    SchemeManager::new("themes", dir, ThemeProcessor).with_extension(app.config().scheme_extension.clone())
}

fn theme(name: &str, accent: &str) -> Theme {
    Theme {
        name: name.to_string(),
        accent: accent.to_string(),
    }
}

fn accent_of(manager: &mut SchemeManager<Theme, ThemeProcessor>, name: &str) -> Option<String> {
    manager.find_scheme(name).unwrap().map(|theme| theme.accent.clone())
}

#[tokio::test]
async fn test_swapping_scheme_names_keeps_both_files() {
    let tmp = TempDir::new().unwrap();
    let app = Application::new(
        EngineConfig::with_config_dir(tmp.path().join("config")),
        ApplicationServices::default(),
    );
    let provider = MemoryStreamProvider::mirror();

    let mut manager = themes(&app).with_stream_provider(Some(provider.clone()), RoamingType::Default);
    manager.add_scheme(theme("Dark", "blue"), true);
    manager.add_scheme(theme("Light", "orange"), true);
    manager.save().into_result().unwrap();

    let dir = manager.dir().to_path_buf();
    assert!(read_string(&dir.join("Dark.xml")).contains("accent=\"blue\""));

    manager.rename_scheme("Dark", "Swap").unwrap();
    manager.rename_scheme("Light", "Dark").unwrap();
    manager.rename_scheme("Swap", "Light").unwrap();
    let result = manager.save();
    assert!(result.is_ok(), "{:?}", result.errors);

    assert_eq!(read_string(&dir.join("Dark.xml")), "<theme accent=\"orange\" name=\"Dark\" />\n");
    assert_eq!(read_string(&dir.join("Light.xml")), "<theme accent=\"blue\" name=\"Light\" />\n");
    assert_eq!(
        provider.get_string("themes/Dark.xml").as_deref(),
        Some("<theme accent=\"orange\" name=\"Dark\" />\n")
    );

    let mut reloaded = themes(&app);
    assert!(reloaded.load_schemes().unwrap().is_empty());
    assert_eq!(accent_of(&mut reloaded, "Dark").as_deref(), Some("orange"));
    assert_eq!(accent_of(&mut reloaded, "Light").as_deref(), Some("blue"));
}

#[tokio::test]
async fn test_removing_every_scheme_removes_directory() {
    let tmp = TempDir::new().unwrap();
    let app = Application::new(
        EngineConfig::with_config_dir(tmp.path().join("config")),
        ApplicationServices::default(),
    );
    let mut manager = themes(&app);
    manager.add_scheme(theme("Dark", "blue"), true);
    manager.save().into_result().unwrap();
    let dir: &Path = manager.dir();
    assert!(dir.is_dir());

    let mut manager = themes(&app);
    manager.load_schemes().unwrap();
    assert!(manager.remove_scheme("Dark").is_some());
    manager.save().into_result().unwrap();
    assert!(!manager.dir().exists());
}
