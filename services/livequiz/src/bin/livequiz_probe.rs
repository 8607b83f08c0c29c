use livequiz::cli::{self, Options};
use livequiz::probe::EchoServer;
use std::process;

fn main() {
    let command = Options::command("livequiz_probe", "Runs an echo server for connectivity smoke tests.");

    let code = cli::main(command, |options, log| {
        let settings = options.load_config()?.settings(options.port)?;
        cli::serve(settings, EchoServer::new(log), log)
    });

    process::exit(code);
}
