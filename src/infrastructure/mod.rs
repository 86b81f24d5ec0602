pub mod alarm_gateway;
pub mod config;
pub mod error;
pub mod occurrence_repository;
pub mod sleep_repository;
pub mod storage;
pub mod task_repository;
