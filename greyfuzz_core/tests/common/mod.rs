#![allow(dead_code)]

use greyfuzz_core::{
    Fuzzer, GreyfuzzConfig, InProcessExecutor, PowerSchedule, PowerScheduler, Trace, UnitMutator,
    trace_point,
};

pub type TextFuzzer<F> =
    Fuzzer<String, InProcessExecutor<String, F>, UnitMutator, PowerScheduler<Box<dyn PowerSchedule>>>;

pub fn build<F>(config: GreyfuzzConfig, harness: F, seeds: &[&str]) -> TextFuzzer<F>
where
    F: FnMut(&String, &mut Trace) -> anyhow::Result<()>,
{
    Fuzzer::from_config(
        config,
        harness,
        UnitMutator::new(),
        seeds.iter().map(|s| s.to_string()),
    )
    .expect("fuzzer builds from a non-empty corpus")
}

pub fn config_with_seed(rng_seed: u64) -> GreyfuzzConfig {
    let mut config = GreyfuzzConfig::default();
    config.fuzzer.rng_seed = rng_seed;
    config
}

/// A small parser-like target with several nested paths.
pub fn branching_target(data: &String, trace: &mut Trace) -> anyhow::Result<()> {
    trace_point!(trace);
    for c in data.chars() {
        if c.is_ascii_digit() {
            trace_point!(trace);
        } else if c.is_ascii_uppercase() {
            trace_point!(trace);
        } else {
            trace_point!(trace);
        }
    }
    if data.len() > 3 {
        trace_point!(trace);
        if data.starts_with('{') {
            trace_point!(trace);
            anyhow::bail!("unterminated object");
        }
    }
    Ok(())
}

pub fn bad_input_target(data: &String, trace: &mut Trace) -> anyhow::Result<()> {
    trace_point!(trace);
    if data == "bad" {
        trace_point!(trace);
        anyhow::bail!("bad input");
    }
    Ok(())
}

pub fn constant_target(_data: &String, trace: &mut Trace) -> anyhow::Result<()> {
    trace_point!(trace);
    trace_point!(trace);
    Ok(())
}

pub fn two_branch_target(data: &String, trace: &mut Trace) -> anyhow::Result<()> {
    trace_point!(trace);
    if data.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
        trace_point!(trace);
    } else {
        trace_point!(trace);
    }
    Ok(())
}
