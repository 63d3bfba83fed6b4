pub struct DefaultsConfig {
    pub temperature: f64,
    pub n_parallel: usize,
    pub n_points: usize,
    pub n_state_tries: usize,
    pub n_vel_tries: usize,
    pub output_prefix: &'static str,
    pub starts_dir: &'static str,
    pub work_dir: &'static str,
    pub poll_interval_ms: u64,
    pub aggregate_poll_ms: u64,
    pub keep_files: bool,
    pub per_worker_processes: usize,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            temperature: 300.0,
            n_parallel: 1,
            n_points: 10,
            n_state_tries: 5,
            n_vel_tries: 5,
            output_prefix: "aimless",
            starts_dir: "starts",
            work_dir: "work",
            poll_interval_ms: 500,
            aggregate_poll_ms: 1000,
            keep_files: false,
            per_worker_processes: 2,
        }
    }
}
