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

// Khora resource cache sandbox
// Headless binary loading fake textures through the cache, frame by frame.

use std::{
    any::Any,
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use anyhow::Result;
use khora_io::resource::{
    texture_estimate, LoadContext, LoadPriority, LoadableResource, Resource, ResourceCache,
    ResourceCacheConfig, ResourceError, ResourceKind, ResourceState, ResourceWatcher,
    ENV_BUDGET_MB,
};

const MB: usize = 1024 * 1024;

/// A texture whose "GPU upload" just records the RGBA8 footprint of its header.
struct Texture {
    path: String,
    width: u32,
    height: u32,
    loaded: AtomicBool,
    stub: bool,
}

impl Texture {
    /// Parses a `WIDTHxHEIGHT` header.
    fn parse(path: &Path) -> Result<(u32, u32), ResourceError> {
        let text = fs::read_to_string(path).map_err(|e| ResourceError::io(path, e))?;
        let (w, h) = text
            .trim()
            .split_once('x')
            .ok_or_else(|| ResourceError::decode(path, "expected WIDTHxHEIGHT"))?;
        let w = w.parse().map_err(|e| ResourceError::decode(path, e))?;
        let h = h.parse().map_err(|e| ResourceError::decode(path, e))?;
        Ok((w, h))
    }
}

impl Resource for Texture {
    fn gpu_memory_size(&self) -> usize {
        if self.is_loaded() && !self.stub {
            self.width as usize * self.height as usize * 4
        } else {
            0
        }
    }

    fn path(&self) -> &str {
        &self.path
    }

    fn unload(&self) -> bool {
        self.loaded.store(false, Ordering::Release);
        true
    }

    fn reload(&self) -> bool {
        let ok = Self::parse(Path::new(&self.path)).is_ok();
        self.loaded.store(ok, Ordering::Release);
        ok
    }

    fn is_loaded(&self) -> bool {
        self.loaded.load(Ordering::Acquire)
    }

    fn state(&self) -> ResourceState {
        match (self.stub, self.is_loaded()) {
            (true, _) => ResourceState::Stub,
            (false, true) => ResourceState::Loaded,
            (false, false) => ResourceState::Unloaded,
        }
    }
}

impl LoadableResource for Texture {
    type Decoded = (u32, u32);

    fn decode(path: &Path) -> Result<(u32, u32), ResourceError> {
        // Pretend decoding is expensive.
        thread::sleep(Duration::from_millis(5));
        Self::parse(path)
    }

    fn upload(
        path: &Path,
        (width, height): (u32, u32),
        ctx: &LoadContext,
    ) -> Result<Self, ResourceError> {
        if !ctx.gpu_enabled {
            return Err(ResourceError::upload(path, "no GPU context"));
        }
        Ok(Self {
            path: path.display().to_string(),
            width,
            height,
            loaded: AtomicBool::new(true),
            stub: false,
        })
    }
}

fn magenta_stub() -> Arc<dyn Any + Send + Sync> {
    Arc::new(Texture {
        path: "<missing texture>".to_string(),
        width: 1,
        height: 1,
        loaded: AtomicBool::new(true),
        stub: true,
    })
}

inventory::submit! {
    ResourceKind::of::<Texture>("Texture")
        .with_estimate(texture_estimate)
        .with_stub(magenta_stub)
}

/// Writes a handful of texture headers to a scratch assets directory.
fn write_assets() -> Result<PathBuf> {
    let dir = std::env::temp_dir().join("khora-sandbox-assets");
    fs::create_dir_all(dir.join("textures"))?;
    for (name, size) in [
        ("ui_atlas", "1024x1024"),
        ("grass", "2048x2048"),
        ("stone", "2048x2048"),
        ("sky", "4096x2048"),
        ("water", "1024x512"),
    ] {
        fs::write(dir.join("textures").join(format!("{name}.tex")), size)?;
    }
    fs::write(dir.join("textures/broken.tex"), "not a header")?;
    Ok(dir)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let assets = write_assets()?;
    let mut config = ResourceCacheConfig::from_env()?
        .with_base_assets_dir(&assets)
        .with_max_uploads_per_frame(2);
    if std::env::var(ENV_BUDGET_MB).is_err() {
        // Small enough for the demo textures to compete for memory.
        config = config.with_budget_mb(48);
    }
    let cache = ResourceCache::new(config)?;
    cache.set_eviction_callback(|path| log::info!("Sandbox: evicted {}", path));
    let watcher = ResourceWatcher::new(&assets)?;

    // The UI atlas must survive any memory pressure.
    cache.pin("textures/ui_atlas.tex");
    let atlas = cache.load::<Texture>("textures/ui_atlas.tex");
    log::info!("Sandbox: atlas loaded = {}", atlas.is_loaded());

    let broken = cache.load::<Texture>("textures/broken.tex");
    log::info!("Sandbox: broken texture falls back to stub = {}", broken.is_stub());

    let pending: Vec<_> = [
        ("textures/sky.tex", LoadPriority::High),
        ("textures/grass.tex", LoadPriority::Normal),
        ("textures/stone.tex", LoadPriority::Normal),
        ("textures/water.tex", LoadPriority::Low),
    ]
    .into_iter()
    .map(|(path, priority)| cache.load_async::<Texture>(path, priority))
    .collect();

    let mut frame = 0;
    while pending.iter().any(|p| !p.is_ready()) && frame < 600 {
        watcher.apply(&cache);
        let uploaded = cache.process_async_uploads();
        if uploaded > 0 {
            log::info!(
                "Sandbox: frame {} uploaded {} texture(s), {:.1}MB in use",
                frame,
                uploaded,
                cache.current_gpu_usage() as f64 / MB as f64
            );
        }
        frame += 1;
        thread::sleep(Duration::from_millis(16));
    }

    for future in pending {
        let path = future.path().to_string();
        match future.try_take() {
            Some(Ok(handle)) => {
                log::info!("Sandbox: {} ready (loaded = {})", path, handle.is_loaded())
            }
            Some(Err(e)) => log::error!("Sandbox: {} failed: {}", path, e),
            None => log::warn!("Sandbox: {} still pending after {} frames", path, frame),
        }
    }

    log::info!(
        "Sandbox: atlas still cached = {}, pressure = {:?}",
        cache.is_cached("textures/ui_atlas.tex"),
        cache.stats().pressure()
    );
    cache.log_stats();
    Ok(())
}
