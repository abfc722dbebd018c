// Copyright 2025 eraflo
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

//! Bookkeeping structures behind the GPU resource cache.
//!
//! Everything here is single-threaded; the cache facade wraps a
//! [`ResourceStore`] in its lock.

mod budget;
mod eviction;
mod pins;
mod recency;
mod store;

pub use budget::*;
pub use eviction::*;
pub use pins::*;
pub use recency::*;
pub use store::*;
