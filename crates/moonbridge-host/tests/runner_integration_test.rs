//! End-to-end tests for loading scripts and mods through the runner
//!
//! These tests verify:
//! - Initial script loading in sorted order
//! - Per-script enable flags and error isolation
//! - Mod entry scripts running with their package context
//! - Full reload dropping cached modules and pending callbacks

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::{Duration, Instant};

use moonbridge_host::{BridgeConfig, ScriptRunner};
use tempfile::TempDir;

fn write_script(dir: &Path, name: &str, source: &str) {
    fs::create_dir_all(dir).expect("Failed to create script dir");
    fs::write(dir.join(name), source).expect("Failed to write script");
}

fn config_for(temp_dir: &TempDir) -> BridgeConfig {
    BridgeConfig {
        script_dir: Some(temp_dir.path().join("scripts")),
        mods_dir: Some(temp_dir.path().join("mods")),
        tick_interval_ms: 10,
        ..Default::default()
    }
}

#[test]
fn test_scripts_load_in_sorted_order() {
    let temp_dir = TempDir::new().unwrap();
    let scripts = temp_dir.path().join("scripts");
    write_script(&scripts, "b.lua", "order = order .. 'b'");
    write_script(&scripts, "a.lua", "order = (order or '') .. 'a'");
    write_script(&scripts, "readme.txt", "not a script");

    let runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();

    assert_eq!(runner.script_count(), 2);
    assert_eq!(runner.script_names(), vec!["a.lua", "b.lua"]);
    assert_eq!(runner.environment().global::<String>("order").unwrap(), "ab");
    assert_eq!(runner.environment().registered_scripts().len(), 2);
}

#[test]
fn test_broken_and_disabled_scripts_are_skipped() {
    let temp_dir = TempDir::new().unwrap();
    let scripts = temp_dir.path().join("scripts");
    write_script(&scripts, "broken.lua", "this is not lua");
    write_script(&scripts, "muted.lua", "muted = true");
    write_script(&scripts, "working.lua", "working = true");

    let mut muted = toml::map::Map::new();
    muted.insert("enabled".to_string(), toml::Value::Boolean(false));
    let config = BridgeConfig {
        config: HashMap::from([("muted".to_string(), toml::Value::Table(muted))]),
        ..config_for(&temp_dir)
    };

    let runner = ScriptRunner::from_config(&config).unwrap();

    assert_eq!(runner.script_names(), vec!["working.lua"]);
    let env = runner.environment();
    assert!(env.global::<bool>("working").unwrap());
    assert!(env.global::<Option<bool>>("muted").unwrap().is_none());
}

#[test]
fn test_loaded_script_is_reused_by_require() {
    let temp_dir = TempDir::new().unwrap();
    let scripts = temp_dir.path().join("scripts");
    write_script(
        &scripts,
        "helpers.lua",
        "helper_runs = (helper_runs or 0) + 1\nhelpers_module = { twice = function(x) return x * 2 end }",
    );
    write_script(&scripts, "main.lua", "result = require('helpers').twice(21)");

    let runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();
    let env = runner.environment();

    assert_eq!(env.global::<i64>("result").unwrap(), 42);
    assert_eq!(env.global::<i64>("helper_runs").unwrap(), 1);
}

#[test]
fn test_mod_entry_runs_with_package_context() {
    let temp_dir = TempDir::new().unwrap();
    let mod_dir = temp_dir.path().join("mods").join("alpha");
    write_script(&mod_dir, "util.lua", "return { value = __MOD_NAME }");
    write_script(&mod_dir, "init.lua", "alpha_value = require('util').value");
    write_script(&temp_dir.path().join("mods").join("empty"), "notes.lua", "");

    let runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();
    let env = runner.environment();

    assert_eq!(runner.script_names(), vec!["alpha/init.lua"]);
    assert_eq!(env.global::<String>("alpha_value").unwrap(), "alpha");

    // Context is cleared once the mod has loaded
    assert!(env.global::<Option<String>>("__MOD_NAME").unwrap().is_none());
}

#[test]
fn test_tick_runs_script_callbacks() {
    let temp_dir = TempDir::new().unwrap();
    write_script(
        &temp_dir.path().join("scripts"),
        "timer.lua",
        "Wait(0.01, function() fired = true end)",
    );

    let mut runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();
    assert_eq!(runner.environment().pending_callbacks(), 1);

    let later = Instant::now() + Duration::from_secs(1);
    assert_eq!(runner.tick(later), 1);
    assert!(runner.environment().global::<bool>("fired").unwrap());
}

#[test]
fn test_reload_rebuilds_environment() {
    let temp_dir = TempDir::new().unwrap();
    let scripts = temp_dir.path().join("scripts");
    write_script(&scripts, "lib.lua", "return { version = 1 }");
    write_script(
        &scripts,
        "main.lua",
        "version = require('lib').version\nWait(100, function() end)",
    );

    let mut runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();
    assert_eq!(runner.environment().global::<i64>("version").unwrap(), 1);
    assert_eq!(runner.environment().pending_callbacks(), 1);
    runner.environment().exec("leftover = true").unwrap();

    write_script(&scripts, "lib.lua", "return { version = 2 }");
    write_script(&scripts, "main.lua", "version = require('lib').version");
    runner.reload().unwrap();

    let env = runner.environment();
    assert_eq!(env.global::<i64>("version").unwrap(), 2);
    assert_eq!(env.pending_callbacks(), 0);
    assert!(env.global::<Option<bool>>("leftover").unwrap().is_none());
    assert_eq!(runner.script_count(), 2);
}

#[test]
fn test_reload_keeps_scene() {
    let temp_dir = TempDir::new().unwrap();
    write_script(
        &temp_dir.path().join("scripts"),
        "spawn.lua",
        "CreateGameObject('Crate')",
    );

    let mut runner = ScriptRunner::from_config(&config_for(&temp_dir)).unwrap();
    assert_eq!(runner.scene().borrow().len(), 1);

    runner.reload().unwrap();
    assert_eq!(runner.scene().borrow().len(), 2);
}
