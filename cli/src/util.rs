use std::io::Read;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::json;

use geopin_assistant::ActionApplier;
use geopin_assistant::applier::APPLIED_KEY;
use geopin_assistant::chat::{CHAT_KEY, ChatLog};
use geopin_assistant::config::data_dir;
use geopin_core::MapStore;
use geopin_core::persist::{BlobStorage, FileBlobStorage, PersistError, load_store, save_store};

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    eprintln!("{}", to_pretty_json(&err));
    std::process::exit(1);
}

pub fn to_pretty_json(value: &impl Serialize) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
}

/// Print `value` as pretty JSON on stdout and return exit code 0.
pub fn print_json(value: &impl Serialize) -> i32 {
    println!("{}", to_pretty_json(value));
    0
}

/// Print a structured error on stderr and return `code`.
pub fn print_error(error: &str, message: &str, code: i32) -> i32 {
    eprintln!(
        "{}",
        to_pretty_json(&json!({ "error": error, "message": message }))
    );
    code
}

/// Read a file, or stdin when `path` is "-".
pub fn read_input(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("Failed to read stdin: {e}"))?;
        return Ok(buf);
    }
    std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))
}

/// The on-disk map store plus the storage it came from.
pub struct Workspace {
    storage: FileBlobStorage,
    pub store: MapStore,
}

impl Workspace {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, PersistError> {
        let storage = FileBlobStorage::new(dir);
        let store = load_store(&storage)?;
        Ok(Self { storage, store })
    }

    pub fn dir(&self) -> &Path {
        self.storage.dir()
    }

    pub fn save(&mut self) -> Result<(), PersistError> {
        save_store(&mut self.storage, &self.store)
    }

    /// Chat log stored next to the map; an unreadable log starts over.
    pub fn load_chat(&self) -> Result<ChatLog, PersistError> {
        let Some(raw) = self.storage.get(CHAT_KEY)? else {
            return Ok(ChatLog::new());
        };
        match serde_json::from_str(&raw) {
            Ok(log) => Ok(log),
            Err(err) => {
                tracing::warn!(error = %err, "discarding unreadable chat log");
                Ok(ChatLog::new())
            }
        }
    }

    pub fn save_chat(&mut self, log: &ChatLog) -> Result<(), PersistError> {
        let raw = serde_json::to_string(log)?;
        self.storage.set(CHAT_KEY, &raw)
    }

    /// Applier seeded with the call ids earlier `apply` runs recorded.
    pub fn load_applier(&self) -> Result<ActionApplier, PersistError> {
        match self.storage.get(APPLIED_KEY)? {
            Some(raw) => Ok(ActionApplier::with_applied(serde_json::from_str(&raw)?)),
            None => Ok(ActionApplier::new()),
        }
    }

    pub fn save_applier(&mut self, applier: &ActionApplier) -> Result<(), PersistError> {
        let raw = serde_json::to_string(applier.applied())?;
        self.storage.set(APPLIED_KEY, &raw)
    }
}

/// Open the workspace under the resolved data dir, exiting on failure.
pub fn open_workspace(explicit: Option<PathBuf>) -> Workspace {
    let dir = data_dir(explicit);
    Workspace::open(&dir).unwrap_or_else(|e| {
        exit_error(
            &format!("Failed to load map store from '{}': {e}", dir.display()),
            Some("Check --data-dir / GEOPIN_DATA_DIR, or move the corrupt map-store.json aside."),
        )
    })
}

/// Save the workspace, exiting on failure.
pub fn save_workspace(workspace: &mut Workspace) {
    if let Err(e) = workspace.save() {
        exit_error(
            &format!("Failed to save map store to '{}': {e}", workspace.dir().display()),
            None,
        );
    }
}
