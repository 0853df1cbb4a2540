pub mod prices;
pub mod roi;
pub mod sync;
pub mod trades;
