pub mod class;
pub mod class_test;
pub mod community;
pub mod interview;
pub mod leaderboard;
pub mod notes;
pub mod notification;
pub mod quiz;
pub mod user;
