mod sleeper;
mod sportsdataio;

pub use sleeper::SleeperAdapter;
pub use sportsdataio::SportsDataIoAdapter;
