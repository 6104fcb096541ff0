pub mod utils;

mod end_to_end;
