use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::report::Report;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub name: String,
    #[serde(default)]
    pub settings: Settings,
    pub reports: Vec<Box<dyn Report>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Relative input paths are resolved against this directory
    pub input_dir: PathBuf,
    /// Relative output paths are resolved against this directory
    pub output_dir: PathBuf,
    pub page_width: u32,
    pub page_height: u32,
    /// TrueType fonts tried in order for bitmap text
    pub font_paths: Vec<PathBuf>,
    /// Printed as the title of every page, e.g. the machine the data came from
    pub system_info: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("."),
            output_dir: PathBuf::from("."),
            page_width: 1200,
            page_height: 800,
            font_paths: [
                "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
                "/usr/share/fonts/dejavu/DejaVuSans.ttf",
                "/usr/share/fonts/TTF/DejaVuSans.ttf",
                "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
                "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
                "/System/Library/Fonts/Supplemental/Arial.ttf",
                "C:\\Windows\\Fonts\\arial.ttf",
            ]
            .into_iter()
            .map(PathBuf::from)
            .collect(),
            system_info: None,
        }
    }
}

impl Settings {
    pub fn page_size(&self) -> (u32, u32) {
        (self.page_width, self.page_height)
    }

    pub fn input(&self, path: &str) -> PathBuf {
        self.input_dir.join(path)
    }

    pub fn output(&self, path: &str) -> PathBuf {
        self.output_dir.join(path)
    }
}
