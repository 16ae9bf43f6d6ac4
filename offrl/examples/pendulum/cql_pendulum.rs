use anyhow::Result;
use clap::Parser;
use offrl::env::pendulum::{
    ActBatch, ObsBatch, Pendulum, PendulumConfig, PendulumConverter, ACT_DIM, OBS_DIM,
};
use offrl_candle_agent::{
    cql::{Cql, CqlConfig},
    mlp::{Mlp, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig},
    Activation,
};
use offrl_core::{
    dataset::TransitionDataset, generic_replay_buffer::SimpleReplayBuffer, record::Recorder,
    Agent, Configurable, DefaultEvaluator, Evaluator as _, Trainer, TrainerConfig,
};
use offrl_tensorboard::TensorboardRecorder;
use std::path::Path;

const LR_ACTOR: f64 = 1e-4;
const LR_CRITIC: f64 = 3e-4;
const BATCH_SIZE: usize = 256;
const MAX_OPTS: usize = 100_000;
const EVAL_INTERVAL: usize = 5_000;
const N_EPISODES_PER_EVAL: usize = 5;
const MODEL_DIR: &str = "./offrl/examples/pendulum/model/cql_pendulum";
const DATASET: &str = "./offrl/examples/pendulum/data/pendulum.bin";

type Env = Pendulum;
type ReplayBuffer = SimpleReplayBuffer<ObsBatch, ActBatch>;
type Evaluator = DefaultEvaluator<Env>;

fn create_agent(lagrange: Option<f64>) -> Result<Cql<Env, Mlp, Mlp2, ReplayBuffer>> {
    let device = candle_core::Device::cuda_if_available(0)?;
    let (in_dim, out_dim) = (OBS_DIM as i64, ACT_DIM as i64);
    let actor_config = GaussianActorConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_ACTOR))
        .out_dim(out_dim)
        .policy_config(MlpConfig::new(in_dim, vec![256, 256], out_dim, Activation::None));
    let critic_config = MultiCriticConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_CRITIC))
        .q_config(MlpConfig::new(in_dim + out_dim, vec![256, 256], 1, Activation::None));
    let cql_config = CqlConfig::default()
        .batch_size(BATCH_SIZE)
        .actor_config(actor_config)
        .critic_config(critic_config)
        .device(device);
    let cql_config = match lagrange {
        Some(target_action_gap) => cql_config.lagrange(target_action_gap),
        None => cql_config,
    };
    Cql::build(cql_config)
}

/// Train/eval CQL agent with a dataset of pendulum transitions
///
/// The dataset is created by `collect_pendulum`.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Train CQL agent, not evaluate
    #[arg(short, long, default_value_t = false)]
    train: bool,

    /// Evaluate CQL agent, not train
    #[arg(short, long, default_value_t = false)]
    eval: bool,

    /// Tune the weight of the CQL penalty with a Lagrange multiplier,
    /// given the threshold of the action gap
    #[arg(long)]
    lagrange: Option<f64>,

    /// Path of the dataset
    #[arg(long, default_value_t = DATASET.to_string())]
    dataset: String,

    /// Directory where the trained model and records are saved
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,
}

fn train(
    max_opts: usize,
    dataset: &str,
    model_dir: &str,
    eval_interval: usize,
    lagrange: Option<f64>,
) -> Result<()> {
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
    let mut agent = create_agent(lagrange)?;
    let mut recorder: Box<dyn Recorder> = Box::new(TensorboardRecorder::new(model_dir));
    let mut evaluator = Evaluator::new(&env_config, 0, N_EPISODES_PER_EVAL)?;

    trainer.train_offline::<Env, _, _, _>(&mut agent, &mut buffer, &mut recorder, &mut evaluator)?;

    Ok(())
}

fn eval(n_episodes: usize, model_dir: &str, lagrange: Option<f64>) -> Result<f32> {
    let env_config = PendulumConfig::default();
    let mut agent = create_agent(lagrange)?;
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
        train(MAX_OPTS, &args.dataset, &args.model_dir, EVAL_INTERVAL, args.lagrange)?;
    }
    if !args.train {
        eval(5, &best, args.lagrange)?;
    }

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use offrl::env::pendulum::{collect_dataset, RandomPolicy};
    use offrl_core::Env as _;
    use tempdir::TempDir;

    fn dataset(dir: &Path) -> Result<String> {
        let mut env = Env::build(&PendulumConfig::default(), 1)?;
        let path = dir.join("pendulum.bin");
        collect_dataset(&mut env, &mut RandomPolicy::new(1), 1000)?.save(&path)?;
        Ok(path.to_str().unwrap().to_string())
    }

    #[test]
    fn test_cql_pendulum() -> Result<()> {
        let tmp = TempDir::new("cql_pendulum")?;
        let dataset = dataset(tmp.path())?;

        for (name, lagrange) in [("fixed", None), ("lagrange", Some(1.0))].iter() {
            let model_dir = tmp.path().join(name);
            let model_dir = model_dir.to_str().unwrap();
            train(20, &dataset, model_dir, 10, *lagrange)?;
            assert!(Path::new(model_dir).join("20").join("critic.pt").exists());
            let episode_return = eval(1, &format!("{}/best", model_dir), *lagrange)?;
            assert!(episode_return.is_finite());
        }

        Ok(())
    }
}
