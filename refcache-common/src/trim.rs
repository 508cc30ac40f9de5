// Copyright 2025 refcache Project Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Debug;

use serde::{Deserialize, Serialize};

/// Memory pressure signal delivered to [`TrimStrategy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrimType {
    /// The process is close to its heap limit.
    CloseToHeapLimit,
    /// System memory is critically low while the app is in the foreground.
    CriticallyLowInForeground,
    /// System memory is low while the app is in the foreground.
    LowInForeground,
    /// System memory is low while the app is in the background.
    LowInBackground,
    /// The app went to the background.
    Backgrounded,
}

impl TrimType {
    /// Fraction of the cache that is suggested to be dropped for this signal.
    pub fn suggested_trim_ratio(&self) -> f64 {
        match self {
            TrimType::CloseToHeapLimit | TrimType::CriticallyLowInForeground | TrimType::LowInForeground => 0.5,
            TrimType::LowInBackground | TrimType::Backgrounded => 1.0,
        }
    }
}

/// Maps a trim signal to the ratio of the cache to drop.
///
/// The returned ratio is expected in `[0, 1]`. `0` drops nothing. Entries held by clients are never dropped.
pub trait TrimStrategy: Send + Sync + 'static + Debug {
    /// Get the trim ratio for the given signal.
    fn trim_ratio(&self, trim_type: TrimType) -> f64;
}

/// Trim strategy that follows [`TrimType::suggested_trim_ratio`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SuggestedTrimStrategy;

impl TrimStrategy for SuggestedTrimStrategy {
    fn trim_ratio(&self, trim_type: TrimType) -> f64 {
        trim_type.suggested_trim_ratio()
    }
}

/// Trim strategy that uses the same ratio for every signal.
#[derive(Debug, Clone, Copy)]
pub struct FixedTrimStrategy(pub f64);

impl TrimStrategy for FixedTrimStrategy {
    fn trim_ratio(&self, _: TrimType) -> f64 {
        self.0
    }
}
