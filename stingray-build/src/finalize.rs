//! Turning a finished build into its durable artifact.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::ArchiveConfig;
use crate::driver::remove_building_dir;
use crate::error::BuildError;
use crate::request::{BuildOutputLocation, DEFAULT_NAME_PREFIX};
use crate::runner::{CommandRunner, CommandSpec};

/// User settings the driver leaves in the build; never shipped.
pub const SETTINGS_DIR: &str = "settings";

/// Name of the archive comment file written next to the build.
pub const ARCHIVE_CONFIG_FILE: &str = "stingray_achieve.conf";

pub const DEFAULT_ARCHIVE_TEMPLATE: &str = include_str!("../assets/stingray_achieve.conf");

/// The durable result of a successful build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// `{output}/{folder_id}`
    Directory(PathBuf),
    /// `{output}/{name}.exe`
    Archive(PathBuf),
}

impl Artifact {
    pub fn path(&self) -> &Path {
        match self {
            Artifact::Directory(path) | Artifact::Archive(path) => path,
        }
    }
}

/// Fill in the archive comment's title and setup command for `name`.
pub fn rewrite_archive_config(template: &str, name: &str) -> String {
    let title = format!(
        "Title=Autodesk Stingray - {}",
        name.replace(DEFAULT_NAME_PREFIX, "")
    );
    let setup = format!(
        r#"Setup=%SystemRoot%\explorer.exe /select,"{name}\editor\stingray_editor.exe""#
    );
    template
        .replace("Title=UPDATE_ME", &title)
        .replace("Setup=UPDATE_ME", &setup)
}

/// The archiver invocation producing `archive` from the contents of `building`.
pub fn archive_command(
    config: &ArchiveConfig,
    name: &str,
    conf: &Path,
    archive: &Path,
    building: &Path,
) -> CommandSpec {
    let mut spec = CommandSpec::new(&config.program)
        .arg("a")
        .arg(format!("-ap{name}"))
        .args(["-r", "-o+", "-sfx", "-m5", "-mt3", "-ep1"]);
    if let Some(icon) = &config.icon {
        spec = spec.arg(format!("-iicon{}", icon.display()));
    }
    if let Some(logo) = &config.logo {
        spec = spec.arg(format!("-iimg{}", logo.display()));
    }
    spec.args(["-x*.pdb", "-x*.map"])
        .arg(format!("-z{}", conf.display()))
        .arg("--")
        .arg(archive.display().to_string())
        .arg(building.join("*.*").display().to_string())
}

pub struct ArtifactFinalizer<'a> {
    runner: &'a dyn CommandRunner,
    config: &'a ArchiveConfig,
}

impl<'a> ArtifactFinalizer<'a> {
    pub fn new(runner: &'a dyn CommandRunner, config: &'a ArchiveConfig) -> Self {
        Self { runner, config }
    }

    /// Package the build in `location.building_dir`. The building directory is
    /// gone afterwards, whether this succeeds or not.
    pub fn finalize(
        &self,
        location: &BuildOutputLocation,
        name: &str,
        zip: bool,
    ) -> Result<Artifact, BuildError> {
        let result = self.package(location, name, zip);
        if result.is_err() {
            remove_building_dir(&location.building_dir);
        }
        result
    }

    fn package(
        &self,
        location: &BuildOutputLocation,
        name: &str,
        zip: bool,
    ) -> Result<Artifact, BuildError> {
        let settings = location.building_dir.join(SETTINGS_DIR);
        if settings.exists() {
            fs::remove_dir_all(&settings).map_err(BuildError::io("remove", &settings))?;
        }

        if zip {
            self.archive(location, name)
        } else {
            self.move_into_place(location)
        }
    }

    fn archive(&self, location: &BuildOutputLocation, name: &str) -> Result<Artifact, BuildError> {
        info!("Zipping...");
        let building = &location.building_dir;

        let template = match &self.config.template {
            Some(path) => fs::read_to_string(path).map_err(|source| BuildError::ArchiveTemplate {
                path: path.clone(),
                source,
            })?,
            None => DEFAULT_ARCHIVE_TEMPLATE.to_string(),
        };
        let conf = building.join(ARCHIVE_CONFIG_FILE);
        fs::write(&conf, rewrite_archive_config(&template, name))
            .map_err(BuildError::io("write", &conf))?;

        let archive = location.archive_path.clone();
        let command = archive_command(self.config, name, &conf, &archive, building);
        debug!("Archiving with {}", command.command_line());

        let output = self
            .runner
            .run(&command)
            .map_err(|source| BuildError::ArchiverSpawn {
                program: command.program.clone(),
                source,
            })?;
        if !output.success() {
            return Err(BuildError::ArchiveFailed {
                archive,
                code: output.code,
            });
        }

        fs::remove_dir_all(building).map_err(BuildError::io("remove", building))?;
        Ok(Artifact::Archive(archive))
    }

    fn move_into_place(&self, location: &BuildOutputLocation) -> Result<Artifact, BuildError> {
        let final_dir = &location.final_dir;
        if final_dir.exists() {
            debug!("Replacing previous build at {}", final_dir.display());
            fs::remove_dir_all(final_dir).map_err(BuildError::io("remove", final_dir))?;
        }
        fs::rename(&location.building_dir, final_dir)
            .map_err(BuildError::io("move build into", final_dir))?;
        Ok(Artifact::Directory(final_dir.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::CommandOutput;
    use std::io;
    use tempfile::TempDir;

    struct ExitWith(Option<i32>);

    impl CommandRunner for ExitWith {
        fn run(&self, _spec: &CommandSpec) -> io::Result<CommandOutput> {
            Ok(CommandOutput {
                code: self.0,
                log: String::new(),
            })
        }
    }

    fn staged_build(temp: &TempDir) -> BuildOutputLocation {
        let location = BuildOutputLocation::new(temp.path(), "abc1234_2024-03-01", "nightly");
        fs::create_dir_all(location.building_dir.join(SETTINGS_DIR)).unwrap();
        fs::create_dir_all(location.building_dir.join("editor")).unwrap();
        fs::write(location.building_dir.join("editor/stingray_editor.exe"), "exe").unwrap();
        location
    }

    #[test]
    fn test_rewrite_archive_config() {
        let template = "Path=x\nSetup=UPDATE_ME\nTitle=UPDATE_ME\n";
        let rewritten = rewrite_archive_config(template, "stingray_abc1234_2024-03-01");
        assert_eq!(
            rewritten,
            "Path=x\n\
             Setup=%SystemRoot%\\explorer.exe /select,\"stingray_abc1234_2024-03-01\\editor\\stingray_editor.exe\"\n\
             Title=Autodesk Stingray - abc1234_2024-03-01\n"
        );
    }

    #[test]
    fn test_bundled_template_has_placeholders() {
        assert!(DEFAULT_ARCHIVE_TEMPLATE.contains("Title=UPDATE_ME"));
        assert!(DEFAULT_ARCHIVE_TEMPLATE.contains("Setup=UPDATE_ME"));
    }

    #[test]
    fn test_archive_command_without_branding() {
        let config = ArchiveConfig {
            program: "rar".to_string(),
            ..ArchiveConfig::default()
        };
        let command = archive_command(
            &config,
            "nightly",
            Path::new("/b/stingray_achieve.conf"),
            Path::new("/out/nightly.exe"),
            Path::new("/b"),
        );
        assert_eq!(
            command.args,
            vec![
                "a",
                "-apnightly",
                "-r",
                "-o+",
                "-sfx",
                "-m5",
                "-mt3",
                "-ep1",
                "-x*.pdb",
                "-x*.map",
                "-z/b/stingray_achieve.conf",
                "--",
                "/out/nightly.exe",
                "/b/*.*",
            ]
        );
    }

    #[test]
    fn test_archive_command_with_branding() {
        let config = ArchiveConfig {
            icon: Some(PathBuf::from("/cfg/stingray_icon.ico")),
            logo: Some(PathBuf::from("/cfg/stingray_logo.bmp")),
            ..ArchiveConfig::default()
        };
        let command = archive_command(
            &config,
            "n",
            Path::new("/b/c.conf"),
            Path::new("/o/n.exe"),
            Path::new("/b"),
        );
        assert_eq!(command.args[8], "-iicon/cfg/stingray_icon.ico");
        assert_eq!(command.args[9], "-iimg/cfg/stingray_logo.bmp");
    }

    #[test]
    fn test_plain_build_moves_into_place_without_settings() {
        let temp = TempDir::new().unwrap();
        let location = staged_build(&temp);
        let config = ArchiveConfig::default();

        let artifact = ArtifactFinalizer::new(&ExitWith(Some(0)), &config)
            .finalize(&location, "nightly", false)
            .unwrap();

        assert_eq!(artifact, Artifact::Directory(location.final_dir.clone()));
        assert!(!location.building_dir.exists());
        assert!(location.final_dir.join("editor/stingray_editor.exe").is_file());
        assert!(!location.final_dir.join(SETTINGS_DIR).exists());
    }

    #[test]
    fn test_failed_move_removes_building_dir() {
        let temp = TempDir::new().unwrap();
        let location = staged_build(&temp);
        fs::write(&location.final_dir, "not a directory").unwrap();
        let config = ArchiveConfig::default();

        let err = ArtifactFinalizer::new(&ExitWith(Some(0)), &config)
            .finalize(&location, "nightly", false)
            .unwrap_err();

        assert!(matches!(err, BuildError::Io { .. }));
        assert!(!location.building_dir.exists());
    }

    #[test]
    fn test_archiver_failure_removes_building_dir() {
        let temp = TempDir::new().unwrap();
        let location = staged_build(&temp);
        let config = ArchiveConfig::default();

        let err = ArtifactFinalizer::new(&ExitWith(Some(1)), &config)
            .finalize(&location, "nightly", true)
            .unwrap_err();

        assert!(matches!(err, BuildError::ArchiveFailed { code: Some(1), .. }));
        assert!(!location.building_dir.exists());
        assert!(!location.final_dir.exists());
    }

    #[test]
    fn test_missing_template_is_a_packaging_error() {
        let temp = TempDir::new().unwrap();
        let location = staged_build(&temp);
        let config = ArchiveConfig {
            template: Some(temp.path().join("missing.conf")),
            ..ArchiveConfig::default()
        };

        let err = ArtifactFinalizer::new(&ExitWith(Some(0)), &config)
            .finalize(&location, "nightly", true)
            .unwrap_err();
        assert!(matches!(err, BuildError::ArchiveTemplate { .. }));
        assert!(!location.building_dir.exists());
    }
}
