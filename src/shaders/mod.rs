//! The 19 compute kernels named in the kernel-library contract, embedded at
//! compile time. Each constant is the raw WGSL source for one kernel;
//! `gpu::PipelineManager` compiles and caches each exactly once per process.

pub const MATMUL: &str = include_str!("matmul.wgsl");
pub const RMSNORM_SQUARES_AND_SUM: &str = include_str!("rmsnorm_squares_and_sum.wgsl");
pub const SUM: &str = include_str!("sum.wgsl");
pub const MAX: &str = include_str!("max.wgsl");
pub const ARGMAX_SET_INDEX: &str = include_str!("argmax_set_index.wgsl");
pub const ARGMAX: &str = include_str!("argmax.wgsl");
pub const SOFTMAX_EXP_AND_SUM: &str = include_str!("softmax_exp_and_sum.wgsl");
pub const SOFTMAX_NORMALIZE: &str = include_str!("softmax_normalize.wgsl");
pub const RMSNORM_NORMALIZE_AND_SCALE: &str = include_str!("rmsnorm_normalize_and_scale.wgsl");
pub const ACCUM: &str = include_str!("accum.wgsl");
pub const POSITIONAL_ENCODING: &str = include_str!("positional_encoding.wgsl");
pub const TRANSFORMER_GET_QUERY_VECTOR: &str = include_str!("transformer_get_query_vector.wgsl");
pub const TRANSFORMER_BUILD_ATT_MAT: &str = include_str!("transformer_build_att_mat.wgsl");
pub const TRANSFORMER_SOFTMAX_INPUT: &str = include_str!("transformer_softmax_input.wgsl");
pub const TRANSFORMER_SOFTMAX_OUTPUT: &str = include_str!("transformer_softmax_output.wgsl");
pub const SILU_AND_MUL_W3: &str = include_str!("silu_and_mul_w3.wgsl");
pub const TEMPERATURE: &str = include_str!("temperature.wgsl");
