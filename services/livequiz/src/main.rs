use livequiz::cli::{self, LaunchError, Options};
use livequiz::server::QuizServer;
use livequiz::store::{JournalStore, MemoryStore};
use std::process;

fn main() {
    let command = Options::command("livequiz", "Runs the live quiz WebSocket server.");

    let code = cli::main(command, |options, log| {
        let config = options.load_config()?;
        let settings = config.settings(options.port)?;

        match &config.session.journal {
            Some(path) => {
                let store = JournalStore::open(path).map_err(LaunchError::from)?;
                cli::serve(settings, QuizServer::new(store, log), log)
            }
            None => cli::serve(settings, QuizServer::new(MemoryStore::new(), log), log),
        }
    });

    process::exit(code);
}
