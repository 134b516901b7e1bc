pub mod chain_context;
pub mod effect_chain;
pub mod frame;
pub mod shader_program;
pub mod stage_link;
pub mod task_executor;

#[cfg(test)]
pub(crate) mod test_util;
