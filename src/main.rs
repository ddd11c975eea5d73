// Scheduler first-run installer
//
// --status                 print whether the system is installed
// --install <request.json> validate the request and run the install
// --settings <file>        installer settings (default: <root>/conf/installer.toml)
// --quiet                  no console log output

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    std::process::exit(scheduler_installer::run_cli(args));
}
