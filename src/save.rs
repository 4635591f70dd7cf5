//! セーブ/ロード機能。
//!
//! ## バージョニング方針
//!
//! - `SAVE_VERSION`: 現在のセーブ形式バージョン。フィールド追加時にインクリメントする。
//! - `MIN_COMPATIBLE_VERSION`: 互換性を維持できる最小バージョン。
//!   新フィールドの追加のみの場合はこの値を変えない。
//!   既存フィールドの意味変更や削除を行った場合のみインクリメントする。
//!
//! The `game` object is the flat `GameState` record minus every `_`-prefixed
//! key. Loading merges saved keys over `GameState::default()` one key at a
//! time: absent keys keep their defaults, unknown keys are ignored, and a key
//! whose value no longer parses also keeps its default.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::PersistError;
use crate::state::{GameState, TRANSIENT_PREFIX};

/// セーブデータのフォーマットバージョン。
pub const SAVE_VERSION: u32 = 1;

/// 互換性を維持できる最小バージョン。
pub const MIN_COMPATIBLE_VERSION: u32 = 1;

/// localStorage / ファイルのキー。
pub const STORAGE_KEY: &str = "crown_clicker_save";

#[derive(Serialize, Deserialize)]
struct SaveData {
    version: u32,
    game: Map<String, Value>,
}

fn is_transient(key: &str) -> bool {
    key.starts_with(TRANSIENT_PREFIX)
}

/// GameState をセーブ用 JSON に変換する。一時フィールドは含まない。
pub fn to_json(state: &GameState) -> Result<String, PersistError> {
    let mut game = match serde_json::to_value(state)? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    game.retain(|key, _| !is_transient(key));
    let data = SaveData {
        version: SAVE_VERSION,
        game,
    };
    Ok(serde_json::to_string(&data)?)
}

/// セーブ JSON から GameState を復元する。
pub fn from_json(json: &str) -> Result<GameState, PersistError> {
    let data: SaveData = serde_json::from_str(json)?;
    if data.version < MIN_COMPATIBLE_VERSION {
        return Err(PersistError::Incompatible {
            found: data.version,
            min: MIN_COMPATIBLE_VERSION,
        });
    }
    if data.version < SAVE_VERSION {
        info!(
            saved = data.version,
            current = SAVE_VERSION,
            "migrating older save"
        );
    }
    merge_over_defaults(data.game)
}

fn merge_over_defaults(saved: Map<String, Value>) -> Result<GameState, PersistError> {
    let mut merged = match serde_json::to_value(GameState::default())? {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    for (key, value) in saved {
        if is_transient(&key) {
            continue;
        }
        let Some(slot) = merged.get_mut(&key) else {
            debug!(%key, "ignoring unknown save key");
            continue;
        };
        let previous = std::mem::replace(slot, value);
        // 壊れた値はデフォルトのまま残す
        if serde_json::from_value::<GameState>(Value::Object(merged.clone())).is_err() {
            warn!(%key, "save key no longer parses; keeping default");
            merged.insert(key, previous);
        }
    }
    Ok(serde_json::from_value(Value::Object(merged))?)
}

// ── Storage backends ────────────────────────────────────────────

/// A single snapshot slot.
pub trait Storage {
    fn read(&self) -> Result<Option<String>, PersistError>;
    fn write(&mut self, data: &str) -> Result<(), PersistError>;
    fn clear(&mut self) -> Result<(), PersistError>;
}

/// In-memory slot. Clones share the same slot, so a test can keep a handle
/// after giving one to the engine.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    slot: std::rc::Rc<std::cell::RefCell<Option<String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(data: &str) -> Self {
        let storage = Self::default();
        *storage.slot.borrow_mut() = Some(data.to_string());
        storage
    }

    pub fn contents(&self) -> Option<String> {
        self.slot.borrow().clone()
    }
}

impl Storage for MemoryStorage {
    fn read(&self) -> Result<Option<String>, PersistError> {
        Ok(self.slot.borrow().clone())
    }

    fn write(&mut self, data: &str) -> Result<(), PersistError> {
        *self.slot.borrow_mut() = Some(data.to_string());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistError> {
        *self.slot.borrow_mut() = None;
        Ok(())
    }
}

/// JSON file on disk.
#[cfg(not(target_arch = "wasm32"))]
#[derive(Clone, Debug)]
pub struct FileStorage {
    path: std::path::PathBuf,
}

#[cfg(not(target_arch = "wasm32"))]
impl FileStorage {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl Storage for FileStorage {
    fn read(&self) -> Result<Option<String>, PersistError> {
        match std::fs::read_to_string(&self.path) {
            Ok(json) => Ok(Some(json)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&mut self, data: &str) -> Result<(), PersistError> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        // 途中で落ちても前のセーブが残るように一時ファイル経由で置き換える
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, data)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), PersistError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Browser localStorage. WASM 環境でのみ動作。
#[cfg(target_arch = "wasm32")]
#[derive(Clone, Debug, Default)]
pub struct LocalStorage;

#[cfg(target_arch = "wasm32")]
impl LocalStorage {
    fn storage() -> Result<web_sys::Storage, PersistError> {
        web_sys::window()
            .and_then(|w| w.local_storage().ok().flatten())
            .ok_or_else(|| PersistError::Unavailable("localStorage is not available".into()))
    }
}

#[cfg(target_arch = "wasm32")]
impl Storage for LocalStorage {
    fn read(&self) -> Result<Option<String>, PersistError> {
        Self::storage()?
            .get_item(STORAGE_KEY)
            .map_err(|e| PersistError::Unavailable(format!("{e:?}")))
    }

    fn write(&mut self, data: &str) -> Result<(), PersistError> {
        Self::storage()?
            .set_item(STORAGE_KEY, data)
            .map_err(|e| PersistError::Unavailable(format!("{e:?}")))
    }

    fn clear(&mut self) -> Result<(), PersistError> {
        Self::storage()?
            .remove_item(STORAGE_KEY)
            .map_err(|e| PersistError::Unavailable(format!("{e:?}")))
    }
}

/// ストレージからゲーム状態を読み込む。
///
/// 空なら `Ok(None)`。壊れたデータや互換性のないバージョンは削除して
/// エラーを返す（呼び出し側で新規ゲームになる）。
pub fn load(storage: &mut dyn Storage) -> Result<Option<GameState>, PersistError> {
    let Some(json) = storage.read()? else {
        return Ok(None);
    };
    match from_json(&json) {
        Ok(state) => Ok(Some(state)),
        Err(e) => {
            warn!(error = %e, "discarding unreadable save");
            storage.clear()?;
            Err(e)
        }
    }
}

/// ゲーム状態を書き込み、書き込んだバイト数を返す。
pub fn save(storage: &mut dyn Storage, state: &GameState) -> Result<usize, PersistError> {
    let json = to_json(state)?;
    storage.write(&json)?;
    Ok(json.len())
}
