use signproxy::{
    cli::{Error, options::Options},
    config::Config,
    signing::RemoteSigner,
};

fn error(error: Error) -> ! {
    eprintln!("{}", error);
    ::std::process::exit(1);
}

fn main() {
    let options = Options::from_args();

    let config = match Config::create(&options.general.config) {
        Ok(config) => config,
        Err(e) => error(e.into()),
    };

    let code = {
        let signer = RemoteSigner::from_config(&config);
        match options.command.run(&signer) {
            Ok(report) => {
                print!("{}", report);
                report.exit_code()
            }
            Err(e) => error(e),
        }
    };

    ::std::process::exit(code);
}
