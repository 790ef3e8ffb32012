use crate::dns::handler::DnsHandler;
use clap::Args;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Starts the DNS server, the core of the machine
#[derive(Args, Debug)]
pub struct Command;

impl Command {
    pub async fn run(&self, config: crate::config::Config) {
        tracing::info!("preparing dns server");

        let addresses = config.dns.addresses().expect("invalid listen address");
        let acl = config.dns.acl();
        let dns64 = config.dns.dns64().expect("invalid dns64 configuration");

        let cache = Arc::new(config.cache.build().expect("invalid local record"));
        let upstreams = Arc::new(config.upstream.build().expect("invalid upstream"));
        let stats = Arc::new(config.stats.build());

        let built = crate::service::refresh::build(&config.blocklist)
            .await
            .expect("unable to build blocklist");
        let blocklist = Arc::new(built.blocklist);

        let handler = Arc::new(DnsHandler::new(
            acl.clone(),
            blocklist.clone(),
            cache.clone(),
            upstreams.clone(),
            stats.clone(),
            dns64,
        ));

        let (shutdown, _) = watch::channel(false);
        let mut tasks = Vec::new();

        for address in addresses.iter().copied() {
            let udp = bronto_server::UdpServer::new(address, handler.clone());
            let receiver = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(error) = udp.run(receiver).await {
                    tracing::error!("udp listener on {address} failed: {error}");
                }
            }));

            let tcp = bronto_server::TcpServer::new(address, handler.clone());
            let receiver = shutdown.subscribe();
            tasks.push(tokio::spawn(async move {
                if let Err(error) = tcp.run(receiver).await {
                    tracing::error!("tcp listener on {address} failed: {error}");
                }
            }));
        }

        tasks.push(tokio::spawn(crate::service::sweeper::run(
            cache.clone(),
            Duration::from_secs(config.cache.flush_interval),
            shutdown.subscribe(),
        )));

        if config.blocklist.refresh {
            tasks.push(tokio::spawn(crate::service::refresh::run(
                blocklist.clone(),
                config.blocklist,
                built.fingerprint,
                shutdown.subscribe(),
            )));
        }

        let listen: Vec<String> = addresses.iter().map(|address| address.to_string()).collect();
        tracing::info!("started server: {}", listen.join(" "));
        tracing::info!("upstream: {}", upstreams.order().join(" "));
        tracing::info!("blocklist: {} rules", blocklist.count());
        tracing::info!("acl: {acl}");

        tokio::signal::ctrl_c()
            .await
            .expect("unable to listen for shutdown signal");
        tracing::info!("shutting down");
        let _ = shutdown.send(true);

        for task in tasks {
            if let Err(error) = task.await {
                tracing::warn!("task ended abnormally: {error:?}");
            }
        }
    }
}
