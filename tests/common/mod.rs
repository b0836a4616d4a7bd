//! Common test utilities and helpers for emuprep tests
#![allow(dead_code)]

use async_trait::async_trait;
use std::cell::Cell;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use emuprep::credentials::{Credential, CredentialPrompter};
use emuprep::process::{ProcessCommand, ProcessOutput, ProcessRunner};
use emuprep::fetch::Fetcher;
use emuprep::sync::AppIdPrompter;
use emuprep::{AppId, Config, Result, SyncOrchestrator, WorkspaceRoot};

/// A scratch workspace with a default configuration pointing at it
pub struct TestEnvironment {
    pub temp_dir: TempDir,
    pub workspace: WorkspaceRoot,
    pub config: Config,
    pub fetcher: Arc<FakeFetcher>,
    pub runner: Arc<FakeToolchain>,
}

impl TestEnvironment {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let workspace = WorkspaceRoot::new(temp_dir.path()).expect("Failed to create workspace");
        let config = Config {
            workspace: temp_dir.path().display().to_string(),
            ..Config::default()
        };

        Self {
            temp_dir,
            workspace,
            config,
            fetcher: Arc::new(FakeFetcher::default()),
            runner: Arc::new(FakeToolchain::default()),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child(&self, relative: &str) -> PathBuf {
        self.workspace.resolve(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.child(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dir");
        }
        std::fs::write(&path, content).expect("Failed to write test file");
        path
    }

    pub fn read(&self, relative: &str) -> String {
        std::fs::read_to_string(self.child(relative)).expect("Failed to read test file")
    }

    /// Place the persistent asset bundle in the workspace
    pub fn with_asset_bundle(self) -> Self {
        self.write(&self.config.assets.bundle.clone(), "7z bundle");
        self
    }

    pub fn orchestrator(&self) -> SyncOrchestrator {
        SyncOrchestrator::new(
            Arc::new(self.config.clone()),
            self.workspace.clone(),
            self.fetcher.clone(),
            self.runner.clone(),
        )
        .expect("Failed to create orchestrator")
    }
}

/// Writes a placeholder body for every URL and records what was fetched
#[derive(Default)]
pub struct FakeFetcher {
    pub urls: Mutex<Vec<String>>,
    pub fail_on: Mutex<Option<String>>,
}

impl FakeFetcher {
    pub fn fetched(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }

    pub fn fail_on(&self, file_name: &str) {
        *self.fail_on.lock().unwrap() = Some(file_name.to_string());
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&self, url: &str, destination: &Path) -> Result<u64> {
        if let Some(name) = self.fail_on.lock().unwrap().as_deref() {
            if url.ends_with(name) {
                return Err(emuprep::SyncError::FetchFailed {
                    url: url.to_string(),
                    status: 404,
                });
            }
        }

        self.urls.lock().unwrap().push(url.to_string());
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        let body = format!("downloaded from {}", url);
        std::fs::write(destination, &body).unwrap();
        Ok(body.len() as u64)
    }
}

/// Simulates the decompression tool and the config generator
///
/// `x <archive> -o<dir>` lays out the files the real archive would contain;
/// `generate_emu_config.exe <appid>` writes settings under `output/<appid>`.
#[derive(Default)]
pub struct FakeToolchain {
    pub commands: Mutex<Vec<ProcessCommand>>,
    pub generator_exit_code: Mutex<Option<i32>>,
}

impl FakeToolchain {
    pub fn commands(&self) -> Vec<ProcessCommand> {
        self.commands.lock().unwrap().clone()
    }

    pub fn program_names(&self) -> Vec<String> {
        self.commands()
            .iter()
            .map(|c| {
                c.program
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default()
            })
            .collect()
    }

    pub fn fail_generator(&self, code: i32) {
        *self.generator_exit_code.lock().unwrap() = Some(code);
    }
}

#[async_trait]
impl ProcessRunner for FakeToolchain {
    async fn run(&self, command: &ProcessCommand) -> Result<ProcessOutput> {
        self.commands.lock().unwrap().push(command.clone());

        let program = command
            .program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let args: Vec<String> = command
            .args
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();

        let mut code = Some(0);
        if args.first().map(String::as_str) == Some("x") {
            let archive = Path::new(&args[1]);
            let out_dir = PathBuf::from(args[2].trim_start_matches("-o"));
            unpack(archive, &out_dir);
        } else if program == "generate_emu_config.exe" {
            match *self.generator_exit_code.lock().unwrap() {
                Some(failure) => code = Some(failure),
                None => {
                    let settings = command.cwd.join("output").join(&args[0]).join("steam_settings");
                    write_tree(
                        &settings,
                        &[
                            ("steam_appid.txt", args[0].as_str()),
                            ("configs.app.ini", "[app::general]\nbuild_id=1\n"),
                            ("achievement_images/a.png", "png"),
                        ],
                    );
                }
            }
        }

        Ok(ProcessOutput {
            code,
            stdout: String::new(),
            stderr: if code == Some(0) {
                String::new()
            } else {
                "generator failed".to_string()
            },
        })
    }
}

fn unpack(archive: &Path, out_dir: &Path) {
    let name = archive
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    match name.as_str() {
        "emu-win-release.7z" => write_tree(
            &out_dir.join("release"),
            &[
                (
                    "steam_settings.EXAMPLE/configs.overlay.EXAMPLE.ini",
                    "[overlay::general]\nenable_experimental_overlay=0\nhook_delay_sec=0\n",
                ),
                ("steam_settings.EXAMPLE/configs.user.EXAMPLE.ini", "[user::general]\n"),
                ("tools/generate_interfaces/generate_interfaces_x64.exe", "exe"),
                ("README.txt", "readme"),
            ],
        ),
        "generate_emu_config-win.7z" => {
            write_tree(
                &out_dir.join("generate_emu_config"),
                &[
                    ("generate_emu_config.exe", "exe"),
                    ("_DEFAULT/0/steam_settings.EXAMPLE/force_language.EXAMPLE.txt", "english"),
                ],
            );
            write_tree(&out_dir.join("parse_controller_vdf"), &[("tool.exe", "exe")]);
            write_tree(&out_dir.join("parse_achievements_schema"), &[("tool.exe", "exe")]);
        }
        "assets.7z" => write_tree(
            &out_dir.join("Emu"),
            &[
                ("steam_api64.dll", "emu dll"),
                ("steam_settings/configs.main.ini", "[main::general]\n"),
            ],
        ),
        _ => {}
    }
}

pub fn write_tree(root: &Path, files: &[(&str, &str)]) {
    for (relative, content) in files {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }
}

/// Answers prompts with fixed values and counts how often it was asked
pub struct FixedPrompter {
    pub credential: Credential,
    pub app_id: AppId,
    pub credential_prompts: Cell<usize>,
    pub app_id_prompts: Cell<usize>,
}

impl FixedPrompter {
    pub fn new(app_id: u32) -> Self {
        Self {
            credential: Credential::new("gaben", "hunter2"),
            app_id: AppId::new(app_id),
            credential_prompts: Cell::new(0),
            app_id_prompts: Cell::new(0),
        }
    }
}

impl CredentialPrompter for FixedPrompter {
    fn prompt_credentials(&self) -> Result<Credential> {
        self.credential_prompts.set(self.credential_prompts.get() + 1);
        Ok(self.credential.clone())
    }
}

impl AppIdPrompter for FixedPrompter {
    fn prompt_app_id(&self) -> Result<AppId> {
        self.app_id_prompts.set(self.app_id_prompts.get() + 1);
        Ok(self.app_id)
    }
}

/// Assertion helpers for test validation
pub fn assert_contains_all(text: &str, expected: &[&str]) {
    for item in expected {
        assert!(
            text.contains(item),
            "Expected text to contain '{}', but it didn't. Text: {}",
            item,
            text
        );
    }
}
