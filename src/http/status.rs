#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub code_num: u16,
    pub message: &'static str,
}

impl Status {
    pub const CONTINUE: Status = Status {
        code_num: 100,
        message: "Continue",
    };
    pub const OK: Status = Status {
        code_num: 200,
        message: "OK",
    };
    pub const BAD_REQUEST: Status = Status {
        code_num: 400,
        message: "Bad Request",
    };
}
