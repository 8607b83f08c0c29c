use livequiz::config::QuizConfig;
use std::process;

fn main() {
    match QuizConfig::default().to_toml() {
        Ok(config) => println!("{}", config),
        Err(err) => {
            eprintln!("Failed to generate config file: {}", err);
            process::exit(1);
        }
    }
}
