use anyhow::Result;
use clap::Parser;
use offrl::env::pendulum::{
    ActBatch, ObsBatch, Pendulum, PendulumConfig, ACT_DIM, OBS_DIM,
};
use offrl_candle_agent::{
    mlp::{Mlp, Mlp2, MlpConfig},
    opt::OptimizerConfig,
    sac::{Sac, SacConfig},
    util::{actor::GaussianActorConfig, critic::MultiCriticConfig},
    Activation,
};
use offrl_core::{
    generic_replay_buffer::{
        SimpleReplayBuffer, SimpleReplayBufferConfig, SimpleStepProcessor,
        SimpleStepProcessorConfig,
    },
    record::Recorder,
    Agent, Configurable, DefaultEvaluator, Env as _, Evaluator as _, ReplayBufferBase,
    StepProcessor, Trainer, TrainerConfig,
};
use offrl_tensorboard::TensorboardRecorder;
use std::path::Path;

const LR_ACTOR: f64 = 3e-4;
const LR_CRITIC: f64 = 3e-4;
const BATCH_SIZE: usize = 128;
const WARMUP_PERIOD: usize = 1000;
const OPT_INTERVAL: usize = 1;
const MAX_OPTS: usize = 40_000;
const EVAL_INTERVAL: usize = 2_000;
const REPLAY_BUFFER_CAPACITY: usize = 100_000;
const N_EPISODES_PER_EVAL: usize = 5;
const MODEL_DIR: &str = "./offrl/examples/pendulum/model/sac_pendulum";

type Env = Pendulum;
type StepProc = SimpleStepProcessor<Env, ObsBatch, ActBatch>;
type ReplayBuffer = SimpleReplayBuffer<ObsBatch, ActBatch>;
type Evaluator = DefaultEvaluator<Env>;

fn create_agent() -> Result<Sac<Env, Mlp, Mlp2, ReplayBuffer>> {
    let device = candle_core::Device::cuda_if_available(0)?;
    let (in_dim, out_dim) = (OBS_DIM as i64, ACT_DIM as i64);
    let actor_config = GaussianActorConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_ACTOR))
        .out_dim(out_dim)
        .policy_config(MlpConfig::new(in_dim, vec![64, 64], out_dim, Activation::None));
    let critic_config = MultiCriticConfig::default()
        .opt_config(OptimizerConfig::default().learning_rate(LR_CRITIC))
        .q_config(MlpConfig::new(in_dim + out_dim, vec![64, 64], 1, Activation::None));
    let sac_config = SacConfig::default()
        .batch_size(BATCH_SIZE)
        .actor_config(actor_config)
        .critic_config(critic_config)
        .device(device);
    Sac::build(sac_config)
}

/// Train/eval SAC agent in pendulum environment
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Train SAC agent, not evaluate
    #[arg(short, long, default_value_t = false)]
    train: bool,

    /// Evaluate SAC agent, not train
    #[arg(short, long, default_value_t = false)]
    eval: bool,

    /// Directory where the trained model and records are saved
    #[arg(long, default_value_t = MODEL_DIR.to_string())]
    model_dir: String,
}

fn train(max_opts: usize, model_dir: &str, eval_interval: usize) -> Result<()> {
    let env_config = PendulumConfig::default();
    let step_proc_config = SimpleStepProcessorConfig {};
    let replay_buffer_config = SimpleReplayBufferConfig::default().capacity(REPLAY_BUFFER_CAPACITY);
    let mut trainer = {
        let config = TrainerConfig::default()
            .max_opts(max_opts)
            .opt_interval(OPT_INTERVAL)
            .eval_interval(eval_interval)
            .record_agent_info_interval(eval_interval)
            .record_compute_cost_interval(eval_interval)
            .flush_record_interval(eval_interval)
            .save_interval(eval_interval)
            .warmup_period(WARMUP_PERIOD)
            .model_dir(model_dir);
        Trainer::build(config)
    };
    let env = Env::build(&env_config, 0)?;
    let step_proc = StepProc::build(&step_proc_config);
    let mut agent = create_agent()?;
    let mut buffer = ReplayBuffer::build(&replay_buffer_config);
    let mut recorder: Box<dyn Recorder> = Box::new(TensorboardRecorder::new(model_dir));
    let mut evaluator = Evaluator::new(&env_config, 0, N_EPISODES_PER_EVAL)?;

    trainer.train(
        env,
        step_proc,
        &mut agent,
        &mut buffer,
        &mut recorder,
        &mut evaluator,
    )?;

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

    if args.train {
        train(MAX_OPTS, &args.model_dir, EVAL_INTERVAL)?;
    } else if args.eval {
        eval(5, &best)?;
    } else {
        train(MAX_OPTS, &args.model_dir, EVAL_INTERVAL)?;
        eval(5, &best)?;
    }

    Ok(())
}
