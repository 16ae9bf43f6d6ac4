use anyhow::Result;
use clap::Parser;
use offrl::env::pendulum::{
    collect_dataset, ActBatch, ObsBatch, Pendulum, PendulumConfig, RandomPolicy, ACT_DIM, OBS_DIM,
};
use offrl_candle_agent::{
    mlp::{Mlp, Mlp2, MlpConfig},
    sac::{Sac, SacConfig},
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig},
    Activation,
};
use offrl_core::{generic_replay_buffer::SimpleReplayBuffer, Agent, Configurable, Env as _};
use std::path::Path;

const N_TRANSITIONS: usize = 100_000;
const MODEL_DIR: &str = "./offrl/examples/pendulum/model/sac_pendulum/best";
const DATASET: &str = "./offrl/examples/pendulum/data/pendulum.bin";

type Env = Pendulum;
type ReplayBuffer = SimpleReplayBuffer<ObsBatch, ActBatch>;

fn create_agent() -> Result<Sac<Env, Mlp, Mlp2, ReplayBuffer>> {
    let (in_dim, out_dim) = (OBS_DIM as i64, ACT_DIM as i64);
    let actor_config = GaussianActorConfig::default()
        .out_dim(out_dim)
        .policy_config(MlpConfig::new(in_dim, vec![64, 64], out_dim, Activation::None));
    let critic_config = MultiCriticConfig::default()
        .q_config(MlpConfig::new(in_dim + out_dim, vec![64, 64], 1, Activation::None));
    let sac_config = SacConfig::default()
        .actor_config(actor_config)
        .critic_config(critic_config)
        .device(candle_core::Device::Cpu);
    Sac::build(sac_config)
}

/// Collect a dataset of pendulum transitions
///
/// Transitions are collected with a SAC agent trained by `sac_pendulum`,
/// sampling actions stochastically, or with uniformly random actions.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Collect transitions with random actions, not with a trained SAC agent
    #[arg(short, long, default_value_t = false)]
    random: bool,

    /// Directory of the parameters of the trained SAC agent
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,

    /// Path of the dataset to be saved
    #[arg(long, default_value_t = DATASET.to_string())]
    dataset: String,

    /// Number of transitions
    #[arg(short, long, default_value_t = N_TRANSITIONS)]
    n_transitions: usize,
}

fn collect(model_dir: Option<&str>, dataset: &str, n_transitions: usize) -> Result<()> {
    let mut env = Env::build(&PendulumConfig::default(), 1)?;
    let dataset_ = match model_dir {
        Some(model_dir) => {
            let mut agent = create_agent()?;
            agent.load_params(Path::new(model_dir))?;
            // Stochastic actions cover more of the state-action space
            agent.train();
            collect_dataset(&mut env, &mut agent, n_transitions)?
        }
        None => collect_dataset(&mut env, &mut RandomPolicy::new(1), n_transitions)?,
    };

    if let Some(parent) = Path::new(dataset).parent() {
        std::fs::create_dir_all(parent)?;
    }
    dataset_.save(dataset)?;
    log::info!(
        "Average reward per transition: {}",
        dataset_.rewards().iter().sum::<f32>() / dataset_.len() as f32
    );

    Ok(())
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let model_dir = match args.random {
        true => None,
        false => Some(args.model_dir.as_str()),
    };
    collect(model_dir, &args.dataset, args.n_transitions)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use offrl_core::dataset::TransitionDataset;
    use tempdir::TempDir;

    #[test]
    fn test_collect_pendulum() -> Result<()> {
        let tmp = TempDir::new("collect_pendulum")?;
        let model_dir = tmp.path().join("model");
        create_agent()?.save_params(&model_dir)?;

        let dataset = tmp.path().join("data").join("pendulum.bin");
        let dataset = dataset.to_str().unwrap();
        collect(Some(model_dir.to_str().unwrap()), dataset, 300)?;
        assert_eq!(TransitionDataset::load(dataset)?.len(), 300);

        collect(None, dataset, 200)?;
        assert_eq!(TransitionDataset::load(dataset)?.len(), 200);

        Ok(())
    }
}
