use std::collections::HashMap;
use std::sync::Arc;

/// A compiled compute pipeline plus the bind group layout wgpu derived for
/// it, so callers never have to redeclare the layout by hand.
pub struct PipelineEntry {
    pub pipeline: wgpu::ComputePipeline,
    pub bind_group_layout: wgpu::BindGroupLayout,
}

/// Compiles each of the 19 kernels (§4.3) exactly once per process, keyed by
/// shader source name. The shader source is compile-time `include_str!`'d
/// WGSL (see `crate::shaders`); recompiling per dispatch would redo shader
/// validation on every autoregressive step.
pub struct PipelineManager {
    cache: HashMap<&'static str, Arc<PipelineEntry>>,
    device: Arc<wgpu::Device>,
}

impl PipelineManager {
    pub fn new(device: Arc<wgpu::Device>) -> Self {
        Self {
            cache: HashMap::new(),
            device,
        }
    }

    pub fn get_or_create(&mut self, key: &'static str, wgsl: &str, entry_point: &str) -> Arc<PipelineEntry> {
        if let Some(entry) = self.cache.get(key) {
            return entry.clone();
        }

        let module = self.device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(key),
            source: wgpu::ShaderSource::Wgsl(wgsl.into()),
        });

        let pipeline = self.device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some(key),
            layout: None,
            module: &module,
            entry_point: Some(entry_point),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            cache: None,
        });

        let bind_group_layout = pipeline.get_bind_group_layout(0);
        let entry = Arc::new(PipelineEntry {
            pipeline,
            bind_group_layout,
        });
        self.cache.insert(key, entry.clone());
        entry
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
