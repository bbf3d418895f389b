mod db;
mod engine;
mod fusion;
mod standard;
