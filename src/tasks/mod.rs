pub mod roster_refresh;
