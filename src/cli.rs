use std::path::PathBuf;

use clap::{Parser, Subcommand};

use magbridge::{Config, DeviceKind};

#[derive(Debug, Parser, Clone)]
#[command(version, about = "Pont magnétomètre (requêtes JSON sur stdin, trames sur stdout)")]
pub struct Cli {
    /// Fichier de configuration JSON
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, value_enum)]
    pub device: Option<DeviceKind>,

    #[arg(long, global = true)]
    pub sample_period_ms: Option<u64>,

    /// Filtre de logs (syntaxe RUST_LOG), prioritaire sur la variable d'environnement
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Sert le protocole sur stdin / stdout (par défaut)
    Serve,
    /// Affiche une seule mesure
    Read,
    /// Affiche la dernière mesure à intervalle régulier
    Watch {
        /// Période en millisecondes (10 000 par défaut)
        #[arg(long)]
        frequency_ms: Option<u64>,
    },
}

impl Cli {
    /// Configuration du fichier, écrasée par les options de la ligne de commande
    pub fn config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::new(),
        };

        if let Some(device) = self.device {
            config.set_device(device);
        }
        if let Some(period) = self.sample_period_ms {
            config.set_sample_period_ms(period);
        }

        config.checked()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overrides_are_checked() {
        let cli = Cli::try_parse_from(["magbridge", "--device", "fake", "read"]).unwrap();
        let config = cli.config().unwrap();
        assert_eq!(config.device(), DeviceKind::Fake);

        let cli = Cli::try_parse_from(["magbridge", "--sample-period-ms", "0"]).unwrap();
        assert!(cli.config().is_err());
    }
}
