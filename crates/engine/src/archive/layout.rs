use super::file_system::ArchiveFileSystem;

pub const DEFAULT_ARCHIVE_EXTENSION: &str = ".pak";
pub const DEFAULT_SEPARATOR: char = '/';

/// Naming convention that maps a city/scene pair onto archive containers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    pub extension: String,
    pub separator: char,
}

impl Default for ArchiveLayout {
    fn default() -> Self {
        Self {
            extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            separator: DEFAULT_SEPARATOR,
        }
    }
}

impl ArchiveLayout {
    pub fn with_extension(extension: impl Into<String>) -> Self {
        let mut extension = extension.into();
        if !extension.starts_with('.') {
            extension.insert(0, '.');
        }
        Self {
            extension: extension.to_ascii_lowercase(),
            ..Self::default()
        }
    }

    pub fn archive_name(&self, city: &str) -> String {
        format!("{}{}", city.to_lowercase(), self.extension)
    }

    /// Path of the scene folder inside segmented containers.
    pub fn scene_folder_path(&self, city: &str, scene: &str) -> String {
        format!(
            "{}{}{}",
            self.archive_name(city),
            self.separator,
            scene.to_lowercase()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedArchive {
    Segmented(String),
    Whole(String),
}

impl ResolvedArchive {
    pub fn archive_name(&self) -> &str {
        match self {
            ResolvedArchive::Segmented(name) | ResolvedArchive::Whole(name) => name,
        }
    }
}

/// Picks the container holding `city`/`scene`. Segment membership is checked
/// first; the whole-region container is the fallback.
pub fn resolve_archive<F: ArchiveFileSystem + ?Sized>(
    file_system: &F,
    layout: &ArchiveLayout,
    city: &str,
    scene: &str,
) -> ResolvedArchive {
    let scene_folder = layout.scene_folder_path(city, scene);
    match file_system.segmented_archive_containing(&scene_folder) {
        Some(container) => ResolvedArchive::Segmented(container),
        None => ResolvedArchive::Whole(layout.archive_name(city)),
    }
}

/// Lower-cases and converts `\` to `/`, dropping empty components.
pub fn normalize_path(raw: &str) -> String {
    raw.split(['/', '\\'])
        .filter(|component| !component.is_empty())
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_lower_cased() {
        let layout = ArchiveLayout::default();
        assert_eq!(layout.archive_name("M01"), "m01.pak");
        assert_eq!(layout.scene_folder_path("M01", "Scene2"), "m01.pak/scene2");
    }

    #[test]
    fn extension_gets_leading_dot() {
        let layout = ArchiveLayout::with_extension("CPK");
        assert_eq!(layout.archive_name("q01"), "q01.cpk");
    }

    #[test]
    fn normalize_handles_both_separators() {
        assert_eq!(normalize_path("\\M01.pak\\Scene1//Map.BIN/"), "m01.pak/scene1/map.bin");
        assert_eq!(normalize_path(""), "");
    }
}
