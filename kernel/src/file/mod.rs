mod fd_table;
mod open_file;

pub use self::{
    fd_table::{FIRST_USER_FD, FdTable},
    open_file::{FileId, OpenFile, SystemFileTable},
};
