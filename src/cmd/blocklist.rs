use clap::Args;

/// Load the configured blocklist sources and print the resulting rules
#[derive(Args, Debug)]
pub struct Command;

impl Command {
    pub async fn run(self, config: crate::config::Config) {
        let built = crate::service::refresh::build(&config.blocklist)
            .await
            .expect("unable to build blocklist");

        tracing::info!("blocklist: {} rules", built.blocklist.count());
        built.blocklist.walk(|name, rules| {
            let rules: Vec<String> = rules.iter().map(|rule| rule.to_string()).collect();
            println!("{name} {}", rules.join(" "));
        });
    }
}
