pub mod video_writer;
