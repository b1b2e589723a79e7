// 后端服务

pub mod sftp;
