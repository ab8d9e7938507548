//! Unreal Engine simulators.
use super::Simulator;
use crate::{error::ScholaError, protocol::ProtocolKind};
use anyhow::{bail, Result};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fs::File,
    io::{BufReader, Write},
    path::{Path, PathBuf},
    process::{Child, Command, Stdio},
    thread,
    time::{Duration, Instant},
};

const PROCESS_KILL_TIMEOUT: Duration = Duration::from_secs(1);

/// An Unreal Editor session started by the user.
///
/// Starting and stopping only record the state; the editor itself is left alone.
#[derive(Debug, Default, Clone)]
pub struct UnrealEditor {
    running: bool,
}

impl Simulator for UnrealEditor {
    fn start(&mut self, _properties: &BTreeMap<String, String>) -> Result<()> {
        info!("Attaching to a running Unreal Editor");
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.running
    }

    fn supported_protocols(&self) -> &[ProtocolKind] {
        &[ProtocolKind::Socket]
    }
}

/// Configuration of [`UnrealExecutable`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnrealExecutableConfig {
    /// Path to the packaged game.
    pub executable_path: PathBuf,

    /// Run without rendering.
    pub headless_mode: bool,

    /// Map to load instead of the project default.
    pub map: Option<String>,

    /// Show the engine log.
    pub display_logs: bool,

    /// Fixed frame rate. `None` runs with a variable time step.
    pub fps: Option<u32>,

    /// Disable the script the plugin launches on startup.
    pub disable_script: bool,
}

impl Default for UnrealExecutableConfig {
    fn default() -> Self {
        Self {
            executable_path: PathBuf::new(),
            headless_mode: false,
            map: None,
            display_logs: true,
            fps: None,
            disable_script: true,
        }
    }
}

impl UnrealExecutableConfig {
    /// Sets the path to the executable.
    pub fn executable_path(mut self, v: impl Into<PathBuf>) -> Self {
        self.executable_path = v.into();
        self
    }

    /// Sets the headless mode.
    pub fn headless_mode(mut self, v: bool) -> Self {
        self.headless_mode = v;
        self
    }

    /// Sets the map.
    pub fn map(mut self, v: impl Into<String>) -> Self {
        self.map = Some(v.into());
        self
    }

    /// Sets whether logs are displayed.
    pub fn display_logs(mut self, v: bool) -> Self {
        self.display_logs = v;
        self
    }

    /// Sets a fixed frame rate.
    pub fn fps(mut self, v: u32) -> Self {
        self.fps = Some(v);
        self
    }

    /// Sets whether the startup script is disabled.
    pub fn disable_script(mut self, v: bool) -> Self {
        self.disable_script = v;
        self
    }

    /// Constructs [`UnrealExecutableConfig`] from YAML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = File::open(path)?;
        let rdr = BufReader::new(file);
        let b = serde_yaml::from_reader(rdr)?;
        Ok(b)
    }

    /// Saves [`UnrealExecutableConfig`].
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = File::create(path)?;
        file.write_all(serde_yaml::to_string(&self)?.as_bytes())?;
        Ok(())
    }
}

/// A packaged Unreal Engine game launched as a child process.
#[derive(Debug)]
pub struct UnrealExecutable {
    config: UnrealExecutableConfig,
    process: Option<Child>,
}

impl UnrealExecutable {
    /// Fails if the executable does not exist.
    pub fn build(config: UnrealExecutableConfig) -> Result<Self> {
        if !config.executable_path.is_file() {
            bail!(
                "executable_path {} does not exist or is not a file",
                config.executable_path.display()
            );
        }
        Ok(Self {
            config,
            process: None,
        })
    }

    /// Command line arguments, excluding the executable itself.
    pub fn make_args(&self, properties: &BTreeMap<String, String>) -> Vec<String> {
        let mut args = vec!["-UNATTENDED".to_string()];
        args.push(match self.config.headless_mode {
            true => "-nullRHI".to_string(),
            false => "-WINDOWED".to_string(),
        });
        if let Some(map) = &self.config.map {
            args.push(map.clone());
        }
        if self.config.display_logs {
            args.push("-LOG".to_string());
        }
        if let Some(fps) = self.config.fps {
            args.push("-BENCHMARK".to_string());
            args.push(format!("-FPS={}", fps));
        }
        if self.config.disable_script {
            args.push("-ScholaDisableScript".to_string());
        }
        for (key, value) in properties.iter() {
            args.push(format!("-Schola{}={}", key, value));
        }
        args
    }

    /// Process id of the running game.
    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().map(Child::id)
    }

    fn wait_with_timeout(child: &mut Child, timeout: Duration) -> Result<bool> {
        let start = Instant::now();
        while start.elapsed() < timeout {
            if child.try_wait()?.is_some() {
                return Ok(true);
            }
            thread::sleep(Duration::from_millis(10));
        }
        Ok(false)
    }
}

impl Simulator for UnrealExecutable {
    fn start(&mut self, properties: &BTreeMap<String, String>) -> Result<()> {
        if let Some(child) = self.process.as_mut() {
            match child.try_wait()? {
                None => return Err(ScholaError::SimulatorAlreadyRunning.into()),
                Some(status) => {
                    // The exit is reported once, the next start launches again.
                    self.process = None;
                    return Err(ScholaError::SimulatorCrashed(format!(
                        "process exited with {} before being stopped",
                        status
                    ))
                    .into());
                }
            }
        }

        let args = self.make_args(properties);
        debug!("Launching {:?} with {:?}", self.config.executable_path, args);
        let output = || match self.config.display_logs {
            true => Stdio::inherit(),
            false => Stdio::null(),
        };
        let child = Command::new(&self.config.executable_path)
            .args(&args)
            .stdout(output())
            .stderr(output())
            .spawn()?;
        info!("Executable launched with PID: {}", child.id());
        self.process = Some(child);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if let Some(mut child) = self.process.take() {
            debug!("Killing subprocess");
            // Fails if the process already exited, which is fine here.
            let _ = child.kill();
            if !Self::wait_with_timeout(&mut child, PROCESS_KILL_TIMEOUT)? {
                warn!("Subprocess did not exit after kill, retrying");
                child.kill()?;
                child.wait()?;
            }
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.process.is_some()
    }

    fn supported_protocols(&self) -> &[ProtocolKind] {
        &[ProtocolKind::Socket]
    }
}

impl Drop for UnrealExecutable {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("Failed to stop the Unreal process: {}", e);
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempdir::TempDir;

    fn executable(dir: &TempDir, config: UnrealExecutableConfig) -> Result<UnrealExecutable> {
        let path = dir.path().join("Game.sh");
        File::create(&path)?;
        UnrealExecutable::build(config.executable_path(path))
    }

    #[test]
    fn test_make_args() -> Result<()> {
        let dir = TempDir::new("unreal_executable")?;
        let simulator = executable(
            &dir,
            UnrealExecutableConfig::default()
                .headless_mode(true)
                .map("/Game/Maps/Arena")
                .fps(30),
        )?;
        let mut properties = BTreeMap::new();
        properties.insert("Port".to_string(), "8002".to_string());
        assert_eq!(
            simulator.make_args(&properties),
            vec![
                "-UNATTENDED",
                "-nullRHI",
                "/Game/Maps/Arena",
                "-LOG",
                "-BENCHMARK",
                "-FPS=30",
                "-ScholaDisableScript",
                "-ScholaPort=8002",
            ]
        );
        Ok(())
    }

    #[test]
    fn test_make_args_windowed() -> Result<()> {
        let dir = TempDir::new("unreal_executable")?;
        let simulator = executable(
            &dir,
            UnrealExecutableConfig::default()
                .display_logs(false)
                .disable_script(false),
        )?;
        assert_eq!(
            simulator.make_args(&BTreeMap::new()),
            vec!["-UNATTENDED", "-WINDOWED"]
        );
        assert!(!simulator.is_running());
        Ok(())
    }

    #[test]
    fn test_missing_executable() {
        let config = UnrealExecutableConfig::default().executable_path("/does/not/exist");
        assert!(UnrealExecutable::build(config).is_err());
    }

    #[test]
    fn test_serde_config() -> Result<()> {
        let config = UnrealExecutableConfig::default()
            .executable_path("/opt/game/Game.sh")
            .headless_mode(true)
            .fps(60);
        let dir = TempDir::new("unreal_executable_config")?;
        let path = dir.path().join("simulator.yaml");
        config.save(&path)?;
        let config_ = UnrealExecutableConfig::load(&path)?;
        assert_eq!(config, config_);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_restart_after_crash() -> Result<()> {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new("unreal_executable_crash")?;
        let path = dir.path().join("Game.sh");
        std::fs::write(&path, "#!/bin/sh\nexit 3\n")?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        let mut simulator = UnrealExecutable::build(
            UnrealExecutableConfig::default()
                .executable_path(path)
                .display_logs(false),
        )?;

        simulator.start(&BTreeMap::new())?;
        if let Some(child) = simulator.process.as_mut() {
            assert!(UnrealExecutable::wait_with_timeout(
                child,
                Duration::from_secs(10)
            )?);
        }
        let err = simulator.start(&BTreeMap::new()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ScholaError>(),
            Some(ScholaError::SimulatorCrashed(_))
        ));
        assert!(!simulator.is_running());

        simulator.start(&BTreeMap::new())?;
        assert!(simulator.is_running());
        simulator.stop()?;
        assert!(!simulator.is_running());
        Ok(())
    }

    #[test]
    fn test_editor_state() -> Result<()> {
        let mut editor = UnrealEditor::default();
        assert!(!editor.is_running());
        editor.start(&BTreeMap::new())?;
        assert!(editor.is_running());
        assert!(editor.supports(ProtocolKind::Socket));
        assert!(!editor.supports(ProtocolKind::InProcess));
        editor.stop()?;
        assert!(!editor.is_running());
        Ok(())
    }
}
