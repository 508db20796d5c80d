//! Global gazetteer registry for singleton management
//!
//! Ensures only one Gazetteer instance exists per data directory, so two
//! handles never append to the same WAL. Weak references let an instance be
//! dropped once every handle is gone.

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Weak;

use super::Gazetteer;

/// Global registry of open gazetteers (canonical data directory -> weak reference)
pub static OPEN_GAZETTEERS: Lazy<Mutex<HashMap<PathBuf, Weak<Gazetteer>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));
