use anyhow::Result;
use clap::Parser;
use offrl::env::pendulum::{
    ActBatch, ObsBatch, Pendulum, PendulumConfig, PendulumConverter, ACT_DIM, OBS_DIM,
};
use offrl_candle_agent::{
    bc::{Bc, BcActionType, BcConfig},
    mlp::{Mlp, MlpConfig},
    opt::OptimizerConfig,
    Activation,
};
use offrl_core::{
    dataset::TransitionDataset, generic_replay_buffer::SimpleReplayBuffer, record::Recorder,
    Agent, Configurable, DefaultEvaluator, Evaluator as _, Trainer, TrainerConfig,
};
use offrl_tensorboard::TensorboardRecorder;
use std::path::Path;

const LR: f64 = 1e-3;
const BATCH_SIZE: usize = 256;
const MAX_OPTS: usize = 20_000;
const EVAL_INTERVAL: usize = 5_000;
const N_EPISODES_PER_EVAL: usize = 5;
const MODEL_DIR: &str = "./offrl/examples/pendulum/model/bc_pendulum";
const DATASET: &str = "./offrl/examples/pendulum/data/pendulum.bin";

type Env = Pendulum;
type ReplayBuffer = SimpleReplayBuffer<ObsBatch, ActBatch>;
type Evaluator = DefaultEvaluator<Env>;

fn create_agent() -> Result<Bc<Env, Mlp, ReplayBuffer>> {
    let device = candle_core::Device::cuda_if_available(0)?;
    let (in_dim, out_dim) = (OBS_DIM as i64, ACT_DIM as i64);
    let bc_config = BcConfig::default()
        .policy_config(MlpConfig::new(in_dim, vec![256, 256], out_dim, Activation::Tanh))
        .opt_config(OptimizerConfig::default().learning_rate(LR))
        .batch_size(BATCH_SIZE)
        .action_type(BcActionType::Continuous)
        .device(device);
    Bc::build(bc_config)
}

/// Train/eval BC agent with a dataset of pendulum transitions
///
/// The dataset is created by `collect_pendulum`.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Train BC agent, not evaluate
    #[arg(short, long, default_value_t = false)]
    train: bool,

    /// Evaluate BC agent, not train
    #[arg(short, long, default_value_t = false)]
    eval: bool,

    /// Path of the dataset
    #[arg(long, default_value_t = DATASET.to_string())]
    dataset: String,

    /// Directory where the trained model and records are saved
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,
}

fn train(max_opts: usize, dataset: &str, model_dir: &str, eval_interval: usize) -> Result<()> {
    let env_config = PendulumConfig::default();
    let mut trainer = {
        let config = TrainerConfig::default()
            .max_opts(max_opts)
            .eval_interval(eval_interval)
            .record_agent_info_interval(eval_interval / 10)
            .record_compute_cost_interval(eval_interval)
            .flush_record_interval(eval_interval)
            .save_interval(eval_interval)
            .model_dir(model_dir);
        Trainer::build(config)
    };
    let mut buffer = TransitionDataset::load(dataset)?.create_replay_buffer(&PendulumConverter, 42)?;
    let mut agent = create_agent()?;
    let mut recorder: Box<dyn Recorder> = Box::new(TensorboardRecorder::new(model_dir));
    let mut evaluator = Evaluator::new(&env_config, 0, N_EPISODES_PER_EVAL)?;

    trainer.train_offline::<Env, _, _, _>(&mut agent, &mut buffer, &mut recorder, &mut evaluator)?;

    Ok(())
}

fn eval(n_episodes: usize, model_dir: &str) -> Result<f32> {
    let env_config = PendulumConfig::default();
    let mut agent = create_agent()?;
    agent.load_params(Path::new(model_dir))?;
    agent.eval();

    let record = Evaluator::new(&env_config, 0, n_episodes)?.evaluate(&mut agent)?;
    let episode_return = record.get_scalar("Episode return")?;
    log::info!("Average return over {} episodes: {}", n_episodes, episode_return);

    Ok(episode_return)
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let best = format!("{}/best", args.model_dir);

    if !args.eval {
        train(MAX_OPTS, &args.dataset, &args.model_dir, EVAL_INTERVAL)?;
    }
    if !args.train {
        eval(5, &best)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use offrl::env::pendulum::{collect_dataset, RandomPolicy};
    use offrl_core::Env as _;
    use tempdir::TempDir;

    #[test]
    fn test_bc_pendulum() -> Result<()> {
        let tmp = TempDir::new("bc_pendulum")?;
        let dataset = tmp.path().join("pendulum.bin");
        let mut env = Env::build(&PendulumConfig::default(), 1)?;
        collect_dataset(&mut env, &mut RandomPolicy::new(1), 1000)?.save(&dataset)?;

        let model_dir = tmp.path().join("model");
        let model_dir = model_dir.to_str().unwrap();
        train(20, dataset.to_str().unwrap(), model_dir, 10)?;
        assert!(Path::new(model_dir).join("10").join("policy_model.pt").exists());
        assert!(eval(1, &format!("{}/best", model_dir))?.is_finite());

        Ok(())
    }
}
