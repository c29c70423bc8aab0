fn main() {
    lidar_segmentation::cli::run();
}
