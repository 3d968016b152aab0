use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::BridgeConfig;
use crate::environment::ScriptEnvironment;
use crate::modules::{PackageContext, RegisteredScript};
use crate::proxy::{SceneGraph, SharedScene};
use crate::script_files;

/// Script each mod directory must contain; it runs once per load
pub const MOD_ENTRY_SCRIPT: &str = "init.lua";

/// Owns the script environment and drives it from the host loop
pub struct ScriptRunner {
    config: BridgeConfig,
    env: ScriptEnvironment,
    scene: SharedScene,
    /// Names of the scripts that ran successfully
    loaded: Vec<String>,
    /// Last time callbacks were ticked
    last_tick: Instant,
    tick_interval: Duration,
}

impl ScriptRunner {
    /// Create a runner with its own empty scene and load scripts if enabled
    pub fn from_config(config: &BridgeConfig) -> Result<Self> {
        Self::with_scene(config, SceneGraph::new().shared())
    }

    /// Create a runner over a scene the host already owns
    pub fn with_scene(config: &BridgeConfig, scene: SharedScene) -> Result<Self> {
        debug!(target: "scripting", "Creating script runner");
        let env = ScriptEnvironment::new(config.environment_options(), scene.clone())
            .map_err(|e| anyhow!("{e}"))
            .context("Failed to create script environment")?;

        let mut runner = Self {
            config: config.clone(),
            env,
            scene,
            loaded: Vec::new(),
            last_tick: Instant::now(),
            tick_interval: config.tick_interval(),
        };

        if runner.config.enabled {
            runner.load_scripts();
        } else {
            info!(target: "scripting", "Scripting disabled, no scripts loaded");
        }

        Ok(runner)
    }

    pub fn environment(&self) -> &ScriptEnvironment {
        &self.env
    }

    pub fn scene(&self) -> SharedScene {
        self.scene.clone()
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    /// Get the number of scripts that loaded successfully
    pub fn script_count(&self) -> usize {
        self.loaded.len()
    }

    /// Get the names of the scripts that loaded successfully
    pub fn script_names(&self) -> Vec<&str> {
        self.loaded.iter().map(String::as_str).collect()
    }

    /// Load top-level scripts, then mods
    ///
    /// A script that fails to load is logged and skipped.
    pub fn load_scripts(&mut self) -> usize {
        let script_dir = self.config.script_dir();
        debug!(target: "scripting", "Loading scripts from {}", script_dir.display());

        for path in script_files::list_scripts(&script_dir) {
            let Some(stem) = script_files::base_name(&path) else {
                continue;
            };
            if !self.config.script_enabled(stem) {
                info!(target: "scripting", "Script {} disabled in config, skipping", stem);
                continue;
            }

            match self.load_script(&path) {
                Ok(name) => self.loaded.push(name),
                Err(e) => error!(target: "scripting", "{:#}", e),
            }
        }

        self.load_mods();

        if !self.loaded.is_empty() {
            info!(target: "scripting", "Loaded {} script(s)", self.loaded.len());
        }
        self.loaded.len()
    }

    /// Register a script by file name, then run it
    fn load_script(&self, path: &Path) -> Result<String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .with_context(|| format!("Invalid script file name: {}", path.display()))?
            .to_string();
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read script {}", path.display()))?;

        self.env
            .register_script(RegisteredScript::new(name.clone(), path));
        self.env
            .exec_named(&name, &source)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Error running script {}", name))?;

        debug!(target: "scripting", "Loaded script {}", name);
        Ok(name)
    }

    /// Run each mod's entry script with that mod's package context active
    ///
    /// The mod's other scripts are reached through `require`.
    fn load_mods(&mut self) {
        let mods_dir = self.config.mods_dir();
        let Ok(entries) = fs::read_dir(&mods_dir) else {
            debug!(target: "scripting", "Mods directory does not exist: {}", mods_dir.display());
            return;
        };

        let mut mod_dirs: Vec<_> = entries
            .flatten()
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .collect();
        mod_dirs.sort();

        for mod_dir in mod_dirs {
            let Some(mod_name) = mod_dir.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !self.config.script_enabled(mod_name) {
                info!(target: "scripting", "Mod {} disabled in config, skipping", mod_name);
                continue;
            }

            let context = PackageContext::new(mod_name, &mod_dir);
            if let Err(e) = self.env.set_package_context(&context) {
                error!(target: "scripting", "Failed to enter mod {}: {}", mod_name, e);
                continue;
            }

            match self.run_mod_entry(&mod_dir.join(MOD_ENTRY_SCRIPT)) {
                Ok(()) => self.loaded.push(format!("{}/{}", mod_name, MOD_ENTRY_SCRIPT)),
                Err(e) => error!(target: "scripting", "Mod {}: {:#}", mod_name, e),
            }

            if let Err(e) = self.env.clear_package_context() {
                warn!(target: "scripting", "Failed to leave mod {}: {}", mod_name, e);
            }
        }
    }

    fn run_mod_entry(&self, path: &Path) -> Result<()> {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read mod entry {}", path.display()))?;

        self.env
            .exec_named(MOD_ENTRY_SCRIPT, &source)
            .map_err(|e| anyhow!("{e}"))
            .with_context(|| format!("Error running {}", path.display()))?;
        Ok(())
    }

    /// Run due callbacks if at least one tick interval has elapsed
    ///
    /// Returns how many callbacks ran.
    pub fn tick(&mut self, now: Instant) -> usize {
        let elapsed = now.saturating_duration_since(self.last_tick);
        if elapsed < self.tick_interval {
            return 0; // Not time to tick yet
        }

        self.last_tick = now;
        self.env.tick(elapsed)
    }

    /// Tear down the environment and load every script again
    ///
    /// Cached modules and pending callbacks are dropped. The scene is kept.
    pub fn reload(&mut self) -> Result<()> {
        let old_script_count = self.loaded.len();
        debug!(target: "scripting", "Reloading scripts");

        self.env.teardown();
        self.loaded.clear();
        self.env = ScriptEnvironment::new(self.config.environment_options(), self.scene.clone())
            .map_err(|e| anyhow!("{e}"))
            .context("Failed to recreate script environment")?;
        self.last_tick = Instant::now();

        if self.config.enabled {
            self.load_scripts();
        }

        let new_script_count = self.loaded.len();
        if old_script_count > 0 && new_script_count == 0 {
            warn!(
                target: "scripting",
                "Script reload resulted in zero scripts (was {}). Check logs for loading errors.",
                old_script_count
            );
        } else if new_script_count > 0 {
            info!(target: "scripting", "Reloaded {} script(s)", new_script_count);
        }
        Ok(())
    }
}
