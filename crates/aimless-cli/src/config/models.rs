use aimless::engine::acceptor::AcceptorSpec;
use aimless::engine::command::CommandSpec;
use aimless::engine::config::ShootingConfig;
use nalgebra::Vector3;
use std::path::PathBuf;

pub struct AppConfig {
    pub starts_dir: PathBuf,
    pub default_box: Option<Vector3<f64>>,
    pub acceptor: AcceptorSpec,
    pub command: CommandSpec,
    pub core_config: ShootingConfig,
}
